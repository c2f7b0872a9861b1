mod assertion;
mod publish;
mod token;

pub use assertion::assertion_command;
pub use publish::publish_command;
pub use token::token_command;
