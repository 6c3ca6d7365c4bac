//! Service layer for the harvester.
//!
//! This module contains everything that talks to the remote API:
//! - HTTP transport seam (`Transport`, `ReqwestTransport`)
//! - Single-request fetcher and lazy paginator (`ApiClient`)
//! - One `UnitSource` per record kind, turning a unit of work (an id, a
//!   month, an account) into raw records

mod accounts;
mod api;
mod staff;
mod subjects;
mod transport;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::RecordKind;

pub use accounts::AccountSource;
pub use api::{ApiClient, Page, classify};
pub use staff::{RelationsSource, StaffSource};
pub use subjects::{MonthSource, SubjectSource};
pub use transport::{RawResponse, ReqwestTransport, Transport};

/// Outcome of a single fetch that did not produce a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The remote resource does not exist; terminal, never retried.
    #[error("not found")]
    NotFound,

    /// 4xx other than 404 (out-of-range page, invalid query); terminal.
    #[error("client error (HTTP {status})")]
    ClientError { status: u16 },

    /// Network failure, timeout, 5xx, rate limiting or an unparseable body.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Fetches the raw records for one unit of work.
///
/// Implementations never touch the corpus; they only talk to the API.
#[async_trait]
pub trait UnitSource: Send + Sync + 'static {
    type Kind: RecordKind;
    type Unit: Clone + fmt::Display + Send + Sync + 'static;

    /// Natural key the unit asked for, when the unit targets one record.
    fn requested_key(&self, unit: &Self::Unit) -> Option<u64>;

    async fn fetch(
        &self,
        unit: &Self::Unit,
    ) -> Result<Vec<<Self::Kind as RecordKind>::Record>, FetchError>;
}
