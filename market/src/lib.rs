pub mod sources;
pub mod types;

pub use sources::{PriceSource, SourceError, SourceRegistry};
pub use types::{Instrument, InstrumentCategory, InstrumentId, NewInstrument, Quote};
