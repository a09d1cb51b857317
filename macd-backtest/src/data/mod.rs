pub mod loader;
pub mod types;

pub use loader::{load_csv, load_csv_reader, parse_date, REQUIRED_COLUMNS};
pub use types::{PriceBar, PriceSeries};
