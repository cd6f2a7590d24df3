pub mod service;

pub use service::{
    load_report, open_session, write_report, ProbeReport, Session, SizingAvailability,
};
