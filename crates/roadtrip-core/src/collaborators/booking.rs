//! In-memory booking catalog.

use super::{BookingCandidate, BookingKind, BookingOffer, BookingService};
use crate::error::CollaboratorResult;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub offer: BookingOffer,
    #[serde(default = "available_by_default")]
    pub available: bool,
}

fn available_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "offer")]
    offers: Vec<CatalogEntry>,
}

/// Offers matched by kind and location. A location matches when either side contains the
/// other, ignoring case.
#[derive(Debug, Clone, Default)]
pub struct CatalogBookingService {
    entries: Vec<CatalogEntry>,
}

impl CatalogBookingService {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// `[[offer]]` tables with name, kind, location, optional price and available flag.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        let file: CatalogFile = toml::from_str(raw)?;
        Ok(Self::new(file.offers))
    }

    pub fn load(path: &Path) -> crate::error::CoreResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&raw)?)
    }

    /// A small coastal California catalog for demos.
    pub fn sample() -> Self {
        let entry =
            |name: &str, kind, location: &str, price: Option<&str>, available| CatalogEntry {
                offer: BookingOffer {
                    name: name.to_string(),
                    kind,
                    location: location.to_string(),
                    price: price.map(str::to_string),
                },
                available,
            };
        Self::new(vec![
            entry("Cypress Inn", BookingKind::Lodging, "Carmel", Some("$289/night"), true),
            entry("Monterey Bay Lodge", BookingKind::Lodging, "Monterey", Some("$219/night"), true),
            entry("Portola Hotel", BookingKind::Lodging, "Monterey", Some("$259/night"), false),
            entry("Old Fisherman's Grotto", BookingKind::Dining, "Monterey", None, true),
            entry("Nepenthe", BookingKind::Dining, "Big Sur", None, true),
            entry(
                "Pfeiffer Big Sur Campground",
                BookingKind::Camping,
                "Big Sur",
                Some("$45/night"),
                true,
            ),
            entry("Bay Cruise", BookingKind::Activity, "San Francisco", Some("$42"), true),
        ])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn location_matches(offer: &str, wanted: &str) -> bool {
    let offer = offer.to_lowercase();
    let wanted = wanted.trim().to_lowercase();
    !wanted.is_empty() && (offer.contains(&wanted) || wanted.contains(&offer))
}

#[async_trait]
impl BookingService for CatalogBookingService {
    async fn check_availability(
        &self,
        candidates: &[BookingCandidate],
    ) -> CollaboratorResult<Vec<BookingOffer>> {
        let mut offers: Vec<BookingOffer> = Vec::new();
        for candidate in candidates {
            for entry in &self.entries {
                if entry.available
                    && entry.offer.kind == candidate.kind
                    && location_matches(&entry.offer.location, &candidate.location)
                    && !offers.contains(&entry.offer)
                {
                    offers.push(entry.offer.clone());
                }
            }
        }
        debug!(candidates = candidates.len(), offers = offers.len(), "catalog availability");
        Ok(offers)
    }
}
