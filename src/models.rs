//! Ride, request and passenger records as the client sees them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::deserializers::{
    de_option_datetime_forgiving, de_option_f64_forgiving, de_option_lenient,
    de_option_request_status, de_option_ride_status, de_option_u32_forgiving, de_vec_lenient,
};
use crate::ids::{EntityId, UserRef, record_ids};

/// The user's relationship to a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    /// Case-insensitive parse that also folds the synonyms the backend has
    /// been seen to emit. Unknown values are `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "requested" => Some(Self::Pending),
            "confirmed" | "accepted" | "approved" => Some(Self::Confirmed),
            "rejected" | "declined" => Some(Self::Rejected),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Active,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" | "open" | "scheduled" => Some(Self::Active),
            "completed" | "finished" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        valid.then_some(Self { lat, lng })
    }

    /// Accepts `{lat, lng}` (or `latitude`/`longitude`/`lon`) and GeoJSON
    /// `[lng, lat]` pairs.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(pair) if pair.len() == 2 => {
                Self::new(pair[1].as_f64()?, pair[0].as_f64()?)
            }
            Value::Object(obj) => {
                let lat = ["lat", "latitude"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_f64))?;
                let lng = ["lng", "lon", "longitude"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_f64))?;
                Self::new(lat, lng)
            }
            _ => None,
        }
    }

    /// Parse `"lat,lng"` as typed on a command line.
    pub fn parse_pair(raw: &str) -> Option<Self> {
        let (lat, lng) = raw.split_once(',')?;
        Self::new(lat.trim().parse().ok()?, lng.trim().parse().ok()?)
    }
}

impl<'de> Deserialize<'de> for Coordinates {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let value = Value::deserialize(deserializer)?;
        Coordinates::from_value(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid coordinates: {}", value)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Location {
    pub fn at(coordinates: Coordinates) -> Self {
        Self {
            coordinates: Some(coordinates),
            ..Self::default()
        }
    }

    /// Best human label: name, then address, then raw coordinates.
    pub fn label(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|s| !s.is_empty()) {
            return name.to_string();
        }
        if let Some(address) = self.address.as_deref().filter(|s| !s.is_empty()) {
            return address.to_string();
        }
        match self.coordinates {
            Some(c) => format!("{:.5}, {:.5}", c.lat, c.lng),
            None => "unknown".to_string(),
        }
    }

    pub fn needs_address(&self) -> bool {
        self.address.as_deref().is_none_or(str::is_empty) && self.coordinates.is_some()
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let value = Value::deserialize(deserializer)?;
        match &value {
            Value::String(address) => Ok(Location {
                address: Some(address.clone()),
                ..Location::default()
            }),
            Value::Object(obj) => {
                let text = |keys: &[&str]| {
                    keys.iter()
                        .find_map(|k| obj.get(*k).and_then(Value::as_str))
                        .map(str::to_string)
                };
                let coordinates = ["coordinates", "coords"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Coordinates::from_value))
                    .or_else(|| Coordinates::from_value(&value));
                Ok(Location {
                    address: text(&["address", "formattedAddress"]),
                    coordinates,
                    name: text(&["name", "label"]),
                })
            }
            other => Err(D::Error::custom(format!("invalid location: {}", other))),
        }
    }
}

/// One user's seat claim on a ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerEntry {
    #[serde(
        default,
        alias = "userId",
        alias = "passenger",
        deserialize_with = "de_option_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub user: Option<UserRef>,
    #[serde(
        default,
        deserialize_with = "de_option_request_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<RequestStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRide")]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropoff: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_seats: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_seats: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserRef>,
    pub passengers: Vec<PassengerEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RideStatus>,
}

impl Ride {
    pub fn is_full(&self) -> bool {
        self.available_seats == Some(0)
    }

    pub fn is_open(&self) -> bool {
        self.status.is_none_or(|s| s == RideStatus::Active)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRide {
    #[serde(default)]
    id: Option<Value>,
    #[serde(rename = "_id", default)]
    mongo_id: Option<Value>,
    #[serde(default, alias = "pickupLocation", deserialize_with = "de_option_lenient")]
    pickup: Option<Location>,
    #[serde(default, alias = "dropoffLocation", deserialize_with = "de_option_lenient")]
    dropoff: Option<Location>,
    #[serde(default, deserialize_with = "de_option_datetime_forgiving")]
    departure_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_option_f64_forgiving")]
    price: Option<f64>,
    #[serde(default, deserialize_with = "de_option_u32_forgiving")]
    available_seats: Option<u32>,
    #[serde(default, deserialize_with = "de_option_u32_forgiving")]
    total_seats: Option<u32>,
    #[serde(
        default,
        alias = "driver",
        alias = "createdBy",
        deserialize_with = "de_option_lenient"
    )]
    creator: Option<UserRef>,
    #[serde(default, deserialize_with = "de_vec_lenient")]
    passengers: Vec<PassengerEntry>,
    #[serde(default, deserialize_with = "de_option_ride_status")]
    status: Option<RideStatus>,
}

impl From<RawRide> for Ride {
    fn from(raw: RawRide) -> Self {
        let mut ids = Map::new();
        if let Some(id) = raw.id {
            ids.insert("id".into(), id);
        }
        if let Some(id) = raw.mongo_id {
            ids.insert("_id".into(), id);
        }
        Ride {
            id: record_ids(&ids).0,
            pickup: raw.pickup,
            dropoff: raw.dropoff,
            departure_time: raw.departure_time,
            price: raw.price,
            available_seats: raw.available_seats,
            total_seats: raw.total_seats,
            creator: raw.creator,
            passengers: raw.passengers,
            status: raw.status,
        }
    }
}

/// A request's pointer to its ride: a bare id or the embedded ride.
#[derive(Debug, Clone, PartialEq)]
pub enum RideRef {
    Id(EntityId),
    Embedded(Box<Ride>),
}

impl RideRef {
    pub fn id(&self) -> Option<&EntityId> {
        match self {
            RideRef::Id(id) => Some(id),
            RideRef::Embedded(ride) => ride.id.as_ref(),
        }
    }

    pub fn ride(&self) -> Option<&Ride> {
        match self {
            RideRef::Id(_) => None,
            RideRef::Embedded(ride) => Some(ride),
        }
    }
}

impl Serialize for RideRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RideRef::Id(id) => id.serialize(serializer),
            RideRef::Embedded(ride) => ride.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RideRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let value = Value::deserialize(deserializer)?;
        if let Some(id) = EntityId::from_scalar(&value) {
            return Ok(RideRef::Id(id));
        }
        if value.is_object() {
            let ride: Ride = serde_json::from_value(value).map_err(D::Error::custom)?;
            return Ok(RideRef::Embedded(Box::new(ride)));
        }
        Err(D::Error::custom(format!("invalid ride reference: {}", value)))
    }
}

/// The current user's request to join a ride, as listed by the backend.
///
/// Fields the client does not model are kept in `extra` so a normalized copy
/// carries everything the backend sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRideRequest")]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    pub id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ride: Option<RideRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RequestStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_request_status: Option<RequestStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub passengers: Vec<PassengerEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RideRequest {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            ride: None,
            ride_id: None,
            user: None,
            status: None,
            user_request_status: None,
            passengers: Vec::new(),
            created_at: None,
            departure_time: None,
            extra: Map::new(),
        }
    }

    pub fn embedded_ride(&self) -> Option<&Ride> {
        self.ride.as_ref().and_then(RideRef::ride)
    }

    /// Ride this request belongs to, if the payload says.
    pub fn resolved_ride_id(&self) -> Option<&EntityId> {
        self.ride
            .as_ref()
            .and_then(RideRef::id)
            .or(self.ride_id.as_ref())
    }

    /// Creation time, else departure time (own or embedded ride), else epoch.
    pub fn recency(&self) -> DateTime<Utc> {
        self.created_at
            .or(self.departure_time)
            .or_else(|| self.embedded_ride().and_then(|r| r.departure_time))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn display_status(&self) -> RequestStatus {
        self.status.unwrap_or(RequestStatus::Pending)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRideRequest {
    #[serde(default)]
    id: Option<Value>,
    #[serde(rename = "_id", default)]
    mongo_id: Option<Value>,
    #[serde(default, deserialize_with = "de_option_lenient")]
    ride: Option<RideRef>,
    #[serde(default, deserialize_with = "de_option_lenient")]
    ride_id: Option<EntityId>,
    #[serde(default, alias = "requester", deserialize_with = "de_option_lenient")]
    user: Option<UserRef>,
    #[serde(default, deserialize_with = "de_option_request_status")]
    status: Option<RequestStatus>,
    #[serde(default, deserialize_with = "de_option_request_status")]
    user_request_status: Option<RequestStatus>,
    #[serde(default, deserialize_with = "de_vec_lenient")]
    passengers: Vec<PassengerEntry>,
    #[serde(
        default,
        alias = "requestedAt",
        deserialize_with = "de_option_datetime_forgiving"
    )]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_option_datetime_forgiving")]
    departure_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<RawRideRequest> for RideRequest {
    type Error = String;

    fn try_from(raw: RawRideRequest) -> Result<Self, Self::Error> {
        let mut ids = Map::new();
        if let Some(id) = raw.id {
            ids.insert("id".into(), id);
        }
        if let Some(id) = raw.mongo_id {
            ids.insert("_id".into(), id);
        }
        let id = record_ids(&ids)
            .0
            .ok_or_else(|| "ride request without an id".to_string())?;
        Ok(RideRequest {
            id,
            ride: raw.ride,
            ride_id: raw.ride_id,
            user: raw.user,
            status: raw.status,
            user_request_status: raw.user_request_status,
            passengers: raw.passengers,
            created_at: raw.created_at,
            departure_time: raw.departure_time,
            extra: raw.extra,
        })
    }
}

/// Body of a request-to-join call.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequestInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropoff: Option<Location>,
    pub seats: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingInput {
    pub ride_id: EntityId,
    pub score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInput {
    pub reported_user: EntityId,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<EntityId>,
}

/// Best-match search by location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchQuery {
    pub pickup: Coordinates,
    pub dropoff: Option<Coordinates>,
}

impl MatchQuery {
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("pickupLat", self.pickup.lat.to_string()),
            ("pickupLng", self.pickup.lng.to_string()),
        ];
        if let Some(dropoff) = self.dropoff {
            pairs.push(("dropoffLat", dropoff.lat.to_string()));
            pairs.push(("dropoffLng", dropoff.lng.to_string()));
        }
        pairs
    }
}
