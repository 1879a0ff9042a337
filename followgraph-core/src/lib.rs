pub mod crawl;
pub mod data;
pub mod error;
pub mod ingest;
pub mod model;
pub mod parse;
pub mod store;

pub use data::Database;
pub use error::{IngestError, ParseError, StoreError};
pub use ingest::{CrawlSummary, FollowerIngestion};
pub use model::{FollowEdge, FollowerPage, NewUser, PaginationCursor, User, UserRecord};
pub use parse::parse_follower_page;
pub use store::{EdgeStore, UserStore};
