pub mod graphql;
pub mod html;
pub mod identity;
pub mod pipeline;
pub mod strategies;

pub use graphql::{GraphqlClient, GraphqlConfig};
pub use html::{HtmlDocument, HtmlElement};
pub use identity::{DomIdentityResolver, IdentitySource, tweet_container};
pub use pipeline::Pipeline;
pub use strategies::{
    ApiStrategy, DataAttributeFallbackStrategy, DomAttributesStrategy, DomMediaStrategy,
    UrlPathStrategy,
};
