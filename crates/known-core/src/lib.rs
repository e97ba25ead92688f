pub mod blog;
pub mod error;
pub mod frontmatter;
pub mod model;
pub mod posts;
pub mod selection;
pub mod store;
pub mod view_state;
