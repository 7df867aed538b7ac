pub mod mail;
pub mod whois;

pub use mail::MailClient;
pub use whois::{LookupError, WhoisClient};
