//! API clients for the external data sources

pub mod page;
pub mod search;
pub mod sec_edgar;

pub use page::{HttpPageFetcher, html_to_text};
pub use search::{DuckDuckGoClient, SearchClient, TavilyClient};
pub use sec_edgar::{SecEdgarClient, filing_url, parse_tickers};
