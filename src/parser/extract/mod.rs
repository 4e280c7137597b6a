pub mod matches;
pub mod participants;
