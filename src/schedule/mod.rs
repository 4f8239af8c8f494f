pub mod client;
pub mod models;
pub mod rooms;

pub use client::{submit_token, HttpScheduleClient, ScheduleApi, ScheduleReply, SubmitError};
pub use models::{RoomsRequest, ScheduleEvent};
