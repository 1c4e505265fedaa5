//! Domain types for DartLab

pub mod bar;
pub mod disclosure;
pub mod pivot;

pub use bar::{DaySnapshot, MatchedPrice, PriceBar};
pub use disclosure::{DisclosureEvent, DisclosureRow};
pub use pivot::{bar_datetime, date_from_pivot, pivot_date, pivot_minute, time_from_minute, PivotSet};
