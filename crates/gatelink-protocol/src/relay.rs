//! Relay-mode resolver: door-level grants/revokes to hardware bit positions.
//!
//! Relay controllers drive outputs directly instead of reader permissions,
//! and three addressing schemes exist in the field:
//!
//! - **Mode 1** — one bit per door: `1 << (door - 1)`.
//! - **Mode 2** — one bit per door, shifted into a second output bank when
//!   the door's second reader slot is populated.
//! - **Mode 3** — addressed index: the data word carries the raw door
//!   ordinal (not a bitmask) and the mask is all-ones, so the statement
//!   claims every position. Merging against a prior mode-3 command must
//!   replace it wholesale — deriving the pair generically would zero-mask
//!   the numeric ordinal.
//!
//! Any other mode value is a configuration error naming the controller.

use crate::rights::Rights;
use gatelink_core::{ControllerRef, DoorRef, Error, Result, constants::SECOND_BANK_SHIFT};

fn relay_mode(ctrl: &ControllerRef) -> Result<u8> {
    ctrl.relay_mode
        .ok_or_else(|| Error::NotARelayController(ctrl.name.clone()))
}

fn door_bits(mode: u8, ctrl: &ControllerRef, door: &DoorRef) -> Result<u32> {
    match mode {
        1 => Ok(1 << (door.number.get() - 1)),
        2 => {
            let mut bits = 1u32 << (door.number.get() - 1);
            if door.has_second_reader() {
                bits <<= SECOND_BANK_SHIFT;
            }
            Ok(bits)
        }
        _ => Err(Error::UnsupportedMode {
            controller: ctrl.name.clone(),
            mode,
        }),
    }
}

/// Resolve a door-level grant into the controller's rights statement.
///
/// # Errors
/// Returns `Error::NotARelayController` if the controller carries no relay
/// mode, or `Error::UnsupportedMode` for a mode outside 1-3.
pub fn relay_grant(ctrl: &ControllerRef, door: &DoorRef) -> Result<Rights> {
    let mode = relay_mode(ctrl)?;
    match mode {
        3 => Ok(Rights::new(u32::from(door.number.get()), u32::MAX)),
        _ => Ok(Rights::grant(door_bits(mode, ctrl, door)?)),
    }
}

/// Resolve a door-level revocation into the controller's rights statement.
///
/// Mode 3 always denies the card everywhere regardless of which door
/// initiated the revocation: the mask stays all-ones with zero data. This
/// is how addressed-index controllers behave in the field, not an oversight.
///
/// # Errors
/// Same failure modes as [`relay_grant`].
pub fn relay_revoke(ctrl: &ControllerRef, door: &DoorRef) -> Result<Rights> {
    let mode = relay_mode(ctrl)?;
    match mode {
        3 => Ok(Rights::new(0, u32::MAX)),
        _ => Ok(Rights::revoke(door_bits(mode, ctrl, door)?)),
    }
}

/// Fold a newer relay statement into a pending one, honoring the mode.
///
/// Mode 3 replaces wholesale (both operands claim everything, and the data
/// word is an ordinal, not a bitmask); modes 1 and 2 use the bitwise merge.
#[must_use]
pub fn relay_merge(mode: u8, pending: Rights, newer: Rights) -> Rights {
    if mode == 3 { newer } else { pending.merge(newer) }
}
