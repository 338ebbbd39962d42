//! Grid storage, cell windows and neighborhoods

mod grid;
mod neighborhood;
mod window;

pub use grid::{GridStatistics, GridView, SharedGrid};
pub use neighborhood::{Neighborhood, steps};
pub use window::CellWindow;
