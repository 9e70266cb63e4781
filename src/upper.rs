//! Service boundary towards the application
//!
//! Requests enter through methods on [`Mac`](crate::lorawan::mac::Mac); their
//! deferred outcomes and unsolicited notifications leave through [`Upper`].

use crate::lorawan::mcps::{McpsConfirm, McpsIndication};
use crate::lorawan::mlme::{MlmeConfirm, MlmeIndication};

/// Receiver of MAC confirms and indications
pub trait Upper {
    /// Outcome of a data request
    fn mcps_confirm(&mut self, confirm: McpsConfirm);

    /// Application payload received in a downlink
    fn mcps_indication(&mut self, indication: McpsIndication<'_>);

    /// Outcome of a management request
    fn mlme_confirm(&mut self, confirm: MlmeConfirm);

    /// Unsolicited management notification
    fn mlme_indication(&mut self, indication: MlmeIndication);
}
