//! Strategy Layer: one `Scraper` contract, three implementations, and the
//! factory that maps a config's declared strategy to a constructed scraper.

mod factory;
mod headless;
mod json_api;
mod parsing;
mod scraper_trait;
mod static_html;

pub use factory::create_scraper;
pub use headless::HeadlessBrowserScraper;
pub use json_api::JsonApiScraper;
pub use parsing::{derive_is_open, parse_percent, parse_ratio};
pub use scraper_trait::Scraper;
pub use static_html::StaticHtmlScraper;
