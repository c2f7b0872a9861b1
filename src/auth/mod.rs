// Service-account authentication
//
// A private key signs a short-lived assertion, which the token endpoint
// trades for a bearer token used by the upload requests.

mod assertion;
mod exchange;
mod key;

pub use assertion::{AssertionSettings, AssertionSigner, Claims};
pub use exchange::{AccessToken, TokenExchanger};
pub use key::{Identity, KeySource};
