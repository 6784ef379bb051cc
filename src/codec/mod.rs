//! Value codec
//!
//! Every cell is stored as text. The codec turns typed values into their
//! canonical stored form and parses stored text back into typed values.
//!
//! # Parse priority (first success wins)
//!
//! 1. `""` → null
//! 2. `true` / `false` (any case) → boolean
//! 3. decimal number → number
//! 4. text containing `GMT` that parses as a date → date
//! 5. `{...}` / `[...]` that parses as a JSON object or array → structured
//! 6. anything else → text

mod text;
mod value;

pub use text::{parse, parse_date_lenient, stringify, DATE_FORMAT};
pub use value::CellValue;
