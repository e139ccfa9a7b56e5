use super::TimeInterface;

/// Wall clock backed by `std::time::SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdTimeSync;

impl TimeInterface for StdTimeSync {
    fn now_wallclock(&self) -> std::time::SystemTime {
        std::time::SystemTime::now()
    }
}
