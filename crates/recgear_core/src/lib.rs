pub mod activities;
pub mod cache;
pub mod config;
pub mod error;
pub mod gear;
pub mod resolve;
pub mod runtime;
pub mod special;
pub mod versions;
pub mod wiki;
pub mod wikitext;

pub use cache::{ItemIdList, RemediationList, ResolutionCache};
pub use error::ResolveError;
pub use gear::{GearSlot, GearSlotEntry, GearStyle};
pub use resolve::{ItemResolver, Resolved};
pub use wiki::{MediaWikiClient, MediaWikiClientConfig, PageSource};
