use serde::Serialize;

use super::api::{Home, Measurement};

/// Latest state of a subscribed home
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedData {
    pub home: Home,
    /// None until the first measurement arrives
    pub measurement: Option<Measurement>,
}

impl FeedData {
    pub fn new(home: Home) -> Self {
        Self {
            home,
            measurement: None,
        }
    }

    pub fn with_measurement(&self, measurement: Measurement) -> Self {
        Self {
            home: self.home.clone(),
            measurement: Some(measurement),
        }
    }
}
