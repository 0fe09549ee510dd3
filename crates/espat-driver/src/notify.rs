//! Applying unsolicited link notices to the link table.

use espat_protocol::Notice;
use tracing::debug;

use crate::links::{LinkFlags, LinkTable};

impl LinkTable {
    /// Apply a notice to the table.
    ///
    /// Returns `false` when the notice names a link outside the table, in
    /// which case the caller treats the token as garbage.
    pub fn apply_notice(&mut self, notice: Notice) -> bool {
        let Some(slot) = self.slot_mut(notice.link()) else {
            return false;
        };

        match notice {
            Notice::DataAvailable { link, len } => {
                if len > 0 {
                    debug!("Link[{}]: {} bytes available", link, len);
                    slot.set_available(len);
                }
            }
            Notice::Connected { link } => {
                // A CONNECT for a link we already hold open (and are not
                // closing) is a replay.
                if slot.available() == 0 && (!slot.is_connected() || slot.is_closing()) {
                    debug!("Link[{}]: incoming connection", link);
                    slot.set_flags(LinkFlags::CONNECTED | LinkFlags::INCOMING);
                }
            }
            Notice::Closed { link } | Notice::ConnectFailed { link } => {
                debug!("Link[{}]: {}", link, notice.kind());
                slot.set_flags(LinkFlags::NONE);
            }
        }
        true
    }
}
