//! Tab rendering modules

mod explorer;
mod git;

pub use explorer::render_explorer_tab;
pub use git::render_changes_tab;
