pub mod participant;
pub mod participant_template;

pub use participant::{Participant, ParticipantKind};
pub use participant_template::ParticipantTemplate;
