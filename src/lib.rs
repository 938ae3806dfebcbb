//! Client for the EPA Toxics Release Inventory via the Envirofacts REST API.
//!
//! ```no_run
//! use tritoolkit::{Filter, TriApiClient};
//!
//! # async fn run() -> tritoolkit::Result<()> {
//! let client = TriApiClient::from_env()?;
//! let mut forms = client.table("TRI_REPORTING_FORM");
//! let frame = forms
//!     .filter(&Filter::new().equals("TRI_CHEM_ID", "N150").one_of("REPORTING_YEAR", ["2020", "2021"]))
//!     .await?;
//! println!("{} rows", frame.len());
//! let facilities = forms.column("TRI_FACILITY_ID")?;
//! # let _ = facilities;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod http;
pub mod pagination;
pub mod query;
pub mod table;

pub use config::{BackoffPolicy, ClientConfig, ResponseFormat};
pub use error::{PermanentError, Result, StateError, TransientError, TriError};
pub use frame::{Frame, Row};
pub use http::{Page, TriApiClient};
pub use query::{Condition, Filter};
pub use table::Table;
