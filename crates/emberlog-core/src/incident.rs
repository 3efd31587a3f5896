use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Closed set of incident categories accepted by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncidentType {
    #[serde(rename = "Structure Fire")]
    StructureFire,
    #[serde(rename = "Vehicle Fire")]
    VehicleFire,
    #[serde(rename = "Wildfire")]
    Wildfire,
    #[serde(rename = "Electrical Fire")]
    ElectricalFire,
    #[serde(rename = "Chemical Fire")]
    ChemicalFire,
    #[serde(rename = "Other")]
    Other,
}

impl IncidentType {
    pub const ALL: [IncidentType; 6] = [
        IncidentType::StructureFire,
        IncidentType::VehicleFire,
        IncidentType::Wildfire,
        IncidentType::ElectricalFire,
        IncidentType::ChemicalFire,
        IncidentType::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            IncidentType::StructureFire => "Structure Fire",
            IncidentType::VehicleFire => "Vehicle Fire",
            IncidentType::Wildfire => "Wildfire",
            IncidentType::ElectricalFire => "Electrical Fire",
            IncidentType::ChemicalFire => "Chemical Fire",
            IncidentType::Other => "Other",
        }
    }

    /// Exact, case-sensitive match against the label set.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label)
    }
}

impl fmt::Display for IncidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A persisted fire incident report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub incident_type: IncidentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Incident {
    /// Assigns a fresh id and creation timestamp to a validated draft.
    pub fn new(draft: IncidentDraft) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: draft.title,
            description: draft.description,
            incident_type: draft.incident_type,
            location: draft.location,
            image: draft.image,
            created_at: Utc::now(),
        }
    }

    /// Replaces the mutable fields with `draft`. `id` and `created_at` never
    /// change, and the current image survives when the draft carries none.
    pub fn apply(&mut self, draft: IncidentDraft) {
        self.title = draft.title;
        self.description = draft.description;
        self.incident_type = draft.incident_type;
        self.location = draft.location;
        if draft.image.is_some() {
            self.image = draft.image;
        }
    }
}

/// Incident fields supplied by a client, without the store-assigned ones.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentDraft {
    pub title: String,
    pub description: Option<String>,
    pub incident_type: IncidentType,
    pub location: Option<String>,
    pub image: Option<String>,
}

impl IncidentDraft {
    pub fn new(title: impl Into<String>, incident_type: IncidentType) -> Self {
        Self {
            title: title.into(),
            description: None,
            incident_type,
            location: None,
            image: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}
