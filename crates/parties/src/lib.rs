//! Parties: the customers we bill and the suppliers we buy from.
//!
//! Pure domain logic, no IO.

pub mod party;

pub use party::{
    ContactInfo, Party, PartyCommand, PartyEvent, PartyId, PartyKind, PartyReactivated,
    PartyRegistered, PartyStatus, PartySuspended, PartyUpdated, ReactivateParty, RegisterParty,
    SuspendParty, UpdateDetails,
};
