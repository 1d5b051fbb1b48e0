//! Channel Member Export Library
//!
//! Retrieves the full member list of a messaging channel through a paged,
//! rate-limited listing API and writes it out as flat JSON records.
//!
//! # Stages
//!
//! 1. **Login** ([`session`]): Interactive code / password challenge when the gateway session is signed out
//! 2. **Resolution** ([`channel`], [`api`]): Parses the user's channel reference and resolves it to a channel entity
//! 3. **Listing** ([`fetch_members`]): Pages through the members with flood-wait backoff and bounded retry
//! 4. **Normalization** ([`normalize`]): Projects each raw member onto a fixed schema
//! 5. **Export** ([`export`]): Writes `user_data.json` and, on request, a plain name list
//!
//! # Example
//!
//! ```no_run
//! use channel_members::api::HttpDirectory;
//! use channel_members::channel::ChannelRef;
//! use channel_members::config::ScraperConfig;
//! use channel_members::fetch_members::{FetchParams, PaginatedFetcher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ScraperConfig::load()?;
//!     let directory = HttpDirectory::new(
//!         config.api_base_url.clone(),
//!         config.credentials.clone(),
//!         &config.rate_limits,
//!     )?;
//!     let fetcher = PaginatedFetcher::new(&directory, FetchParams::from(&config.fetch));
//!     let channel = fetcher.resolve(&ChannelRef::parse("@rustlang")?).await?;
//!     let members = fetcher.fetch_all(&channel).await;
//!     println!("Fetched {} members", members.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod channel;
pub mod config;
pub mod export;
pub mod fetch_members;
pub mod normalize;
pub mod schemas;
pub mod session;

// Re-export commonly used types
pub use config::ScraperConfig;
pub use fetch_members::{FetchParams, PaginatedFetcher};
pub use schemas::{ChannelInfo, MemberRecord, NormalizedRecord, PageResult, RunMetadata};
