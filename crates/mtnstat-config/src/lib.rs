//! Configuration Registry: the source-controlled, read-only catalog of
//! per-mountain scraping contracts.

mod model;
mod registry;

pub use model::{
    HeadlessParams, HttpMethod, JsonApiParams, MountainConfig, StaticHtmlParams, StrategyParams,
    TransformRule,
};
pub use registry::ConfigRegistry;
