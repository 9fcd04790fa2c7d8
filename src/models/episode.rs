use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

/// The composite key of an episode listing. Both fields are required: a
/// season identifier alone does not identify a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeasonKey {
    pub show_id: i64,
    pub season_id: i64,
}

impl SeasonKey {
    pub fn new(show_id: i64, season_id: i64) -> Self {
        Self { show_id, season_id }
    }
}

impl fmt::Display for SeasonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "show:{}/season:{}", self.show_id, self.season_id)
    }
}

/// Represents an episode of a show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// The unique identifier for the episode.
    pub id: i64,
    /// The show the episode belongs to.
    pub show_id: i64,
    /// The season the episode belongs to.
    pub season_id: i64,
    /// The position of the episode within its season.
    pub episode_number: i32,
    /// The title of the episode.
    pub title: String,
    /// A short synopsis.
    pub description: Option<String>,
    /// The original air date.
    pub air_date: Option<NaiveDate>,
    /// The runtime in minutes.
    pub runtime_minutes: Option<i32>,
    /// The director.
    pub director: Option<String>,
    /// The writer.
    pub writer: Option<String>,
    /// A thumbnail image URL.
    pub thumbnail_url: Option<String>,
    /// The rating from 0 to 10.
    pub rating: Option<f64>,
    /// The timestamp when the episode was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the episode was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Episode {
    pub fn key(&self) -> SeasonKey {
        SeasonKey::new(self.show_id, self.season_id)
    }
}

/// The request payload for creating an episode.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewEpisode {
    #[garde(range(min = 1))]
    pub show_id: i64,
    #[garde(range(min = 1))]
    pub season_id: i64,
    #[garde(range(min = 1))]
    pub episode_number: i32,
    #[garde(length(min = 1, max = 255))]
    pub title: String,
    #[garde(skip)]
    #[serde(default)]
    pub description: Option<String>,
    #[garde(skip)]
    #[serde(default)]
    pub air_date: Option<NaiveDate>,
    #[garde(range(min = 1))]
    #[serde(default)]
    pub runtime_minutes: Option<i32>,
    #[garde(skip)]
    #[serde(default)]
    pub director: Option<String>,
    #[garde(skip)]
    #[serde(default)]
    pub writer: Option<String>,
    #[garde(length(max = 2048))]
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[garde(range(min = 0.0, max = 10.0))]
    #[serde(default)]
    pub rating: Option<f64>,
}

impl NewEpisode {
    pub fn key(&self) -> SeasonKey {
        SeasonKey::new(self.show_id, self.season_id)
    }
}
