//! Participants: the applications, runtimes and runtime contexts that are
//! linked into formations.

pub mod models;

pub use models::{Participant, ParticipantKind, ParticipantTemplate};
