mod provider;
mod queries;

pub use provider::GraphqlAdapter;
