//! API endpoint integration tests
//!
//! Tests for the token ledger and generation pipeline HTTP surfaces,
//! plus the cross-domain invariants and end-to-end scenarios from
//! spec §8.

#[allow(dead_code)]
mod common;
mod generations;
mod invariants;
mod ledger;
