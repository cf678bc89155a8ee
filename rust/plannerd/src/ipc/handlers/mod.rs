pub mod activities;
pub mod core;
pub mod schedule;
pub mod setup;
pub mod subjects;
pub mod timetable;
