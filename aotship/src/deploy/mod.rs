//! Deployment module

pub mod fsm;
pub mod request;
pub mod sequencer;
