mod provider;
mod request;

pub use provider::RestAdapter;
