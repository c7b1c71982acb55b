//! Integration tests for aotship

mod test_exec;
mod test_fsm;
mod test_publisher;
mod test_sequencer;
mod test_sync;
