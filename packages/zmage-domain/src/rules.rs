//! Smart-album rule documents.
//!
//! A rule document is a JSON object with a closed set of optional keys. Parsing compiles it into
//! a flat list of [`RuleCondition`]s that are combined with AND semantics. Unknown keys and
//! values of the wrong shape are rejected with a path-qualified [`Error::InvalidRule`]. Well-formed
//! values that cannot be used (an unknown asset type, a bad date, coordinates out of range) give
//! [`Error::InvalidRuleValue`] instead. A document that parses but carries no effective condition
//! matches nothing.

use std::cmp::Ordering;

use serde_json::{Map, Value};
use time::{
	Date, OffsetDateTime, PrimitiveDateTime, Time, format_description::well_known::Rfc3339,
	macros::format_description,
};

use crate::{Error, Result, asset::AssetType};

/// Kilometres per degree used by the location bounding box. This is a flat approximation, not a
/// geodesic distance.
pub const DEGREE_KM: f64 = 111.0;
pub const DEFAULT_RADIUS_KM: f64 = 10.0;

const ROOT_PATH: &str = "$.rules";
const TOP_LEVEL_KEYS: [&str; 5] = ["tags", "date_range", "camera_model", "asset_type", "location"];

#[derive(Debug, Clone, PartialEq)]
pub enum RuleCondition {
	/// The asset must carry at least one of these tags.
	TagsInclude(Vec<String>),
	/// The asset must carry none of these tags.
	TagsExclude(Vec<String>),
	TakenFrom(OffsetDateTime),
	TakenTo(OffsetDateTime),
	CameraModel(String),
	AssetType(AssetType),
	Near(LocationRule),
}
impl RuleCondition {
	pub fn matches(&self, subject: &RuleSubject<'_>) -> bool {
		match self {
			Self::TagsInclude(tags) => tags.iter().any(|tag| subject.tags.contains(tag)),
			Self::TagsExclude(tags) => !tags.iter().any(|tag| subject.tags.contains(tag)),
			Self::TakenFrom(start) => subject.taken_at.is_some_and(|taken| taken >= *start),
			Self::TakenTo(end) => subject.taken_at.is_some_and(|taken| taken <= *end),
			Self::CameraModel(model) => subject.camera_model == Some(model.as_str()),
			Self::AssetType(kind) => subject.asset_type == *kind,
			Self::Near(location) => match (subject.latitude, subject.longitude) {
				(Some(lat), Some(lon)) => location.contains(lat, lon),
				_ => false,
			},
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationRule {
	pub lat: f64,
	pub lon: f64,
	pub radius_km: f64,
}
impl LocationRule {
	pub fn delta_degrees(&self) -> f64 {
		self.radius_km / DEGREE_KM
	}

	pub fn contains(&self, lat: f64, lon: f64) -> bool {
		let delta = self.delta_degrees();

		(lat - self.lat).abs() <= delta && (lon - self.lon).abs() <= delta
	}
}

/// The asset fields a rule can observe.
#[derive(Debug, Clone, Copy)]
pub struct RuleSubject<'a> {
	pub tags: &'a [String],
	pub taken_at: Option<OffsetDateTime>,
	pub camera_model: Option<&'a str>,
	pub asset_type: AssetType,
	pub latitude: Option<f64>,
	pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmartRules {
	conditions: Vec<RuleCondition>,
}
impl SmartRules {
	pub fn parse(raw: &Value) -> Result<Self> {
		let obj = match raw {
			Value::Null => return Ok(Self::default()),
			Value::Object(obj) => obj,
			_ => return Err(invalid(ROOT_PATH, "rules must be an object.")),
		};

		reject_unknown_keys(obj, ROOT_PATH, &TOP_LEVEL_KEYS)?;

		let mut conditions = Vec::new();

		if let Some(tags) = non_null(obj, "tags") {
			parse_tags(tags, &format!("{ROOT_PATH}.tags"), &mut conditions)?;
		}
		if let Some(range) = non_null(obj, "date_range") {
			parse_date_range(range, &format!("{ROOT_PATH}.date_range"), &mut conditions)?;
		}
		if let Some(model) = non_null(obj, "camera_model") {
			let model = expect_str(model, &format!("{ROOT_PATH}.camera_model"))?.trim();

			if !model.is_empty() {
				conditions.push(RuleCondition::CameraModel(model.to_string()));
			}
		}
		if let Some(kind) = non_null(obj, "asset_type") {
			let path = format!("{ROOT_PATH}.asset_type");
			let kind = expect_str(kind, &path)?.parse::<AssetType>().map_err(|_| {
				unusable(&path, "asset_type must be one of image, video, document, or other.")
			})?;

			conditions.push(RuleCondition::AssetType(kind));
		}
		if let Some(location) = non_null(obj, "location") {
			conditions.push(RuleCondition::Near(parse_location(
				location,
				&format!("{ROOT_PATH}.location"),
			)?));
		}

		Ok(Self { conditions })
	}

	pub fn conditions(&self) -> &[RuleCondition] {
		&self.conditions
	}

	/// True when the document would match everything. Such documents evaluate to an empty result.
	pub fn is_empty(&self) -> bool {
		self.conditions.is_empty()
	}

	pub fn matches(&self, subject: &RuleSubject<'_>) -> bool {
		!self.is_empty() && self.conditions.iter().all(|condition| condition.matches(subject))
	}

	/// Canonical JSON form, suitable for storage and for parsing back.
	pub fn to_value(&self) -> Value {
		let mut root = Map::new();
		let mut tags = Map::new();
		let mut range = Map::new();

		for condition in &self.conditions {
			match condition {
				RuleCondition::TagsInclude(list) => {
					tags.insert("include".to_string(), Value::from(list.clone()));
				},
				RuleCondition::TagsExclude(list) => {
					tags.insert("exclude".to_string(), Value::from(list.clone()));
				},
				RuleCondition::TakenFrom(ts) => {
					range.insert("start".to_string(), rfc3339_value(*ts));
				},
				RuleCondition::TakenTo(ts) => {
					range.insert("end".to_string(), rfc3339_value(*ts));
				},
				RuleCondition::CameraModel(model) => {
					root.insert("camera_model".to_string(), Value::from(model.clone()));
				},
				RuleCondition::AssetType(kind) => {
					root.insert("asset_type".to_string(), Value::from(kind.as_str()));
				},
				RuleCondition::Near(location) => {
					root.insert(
						"location".to_string(),
						serde_json::json!({
							"lat": location.lat,
							"lon": location.lon,
							"radius_km": location.radius_km,
						}),
					);
				},
			}
		}

		if !tags.is_empty() {
			root.insert("tags".to_string(), Value::Object(tags));
		}
		if !range.is_empty() {
			root.insert("date_range".to_string(), Value::Object(range));
		}

		Value::Object(root)
	}
}

/// Result ordering for rule evaluation: `taken_at` descending with undated assets last, then
/// id descending so equal timestamps still order deterministically.
pub fn compare_rule_order(
	a_taken: Option<OffsetDateTime>,
	a_id: i64,
	b_taken: Option<OffsetDateTime>,
	b_id: i64,
) -> Ordering {
	let by_time = match (a_taken, b_taken) {
		(Some(a), Some(b)) => b.cmp(&a),
		(Some(_), None) => Ordering::Less,
		(None, Some(_)) => Ordering::Greater,
		(None, None) => Ordering::Equal,
	};

	by_time.then_with(|| b_id.cmp(&a_id))
}

fn parse_tags(raw: &Value, path: &str, out: &mut Vec<RuleCondition>) -> Result<()> {
	let obj = raw.as_object().ok_or_else(|| invalid(path, "tags must be an object."))?;

	reject_unknown_keys(obj, path, &["include", "exclude"])?;

	if let Some(list) = non_null(obj, "include") {
		let include = parse_string_list(list, &format!("{path}.include"))?;

		if !include.is_empty() {
			out.push(RuleCondition::TagsInclude(include));
		}
	}
	if let Some(list) = non_null(obj, "exclude") {
		let exclude = parse_string_list(list, &format!("{path}.exclude"))?;

		if !exclude.is_empty() {
			out.push(RuleCondition::TagsExclude(exclude));
		}
	}

	Ok(())
}

fn parse_date_range(raw: &Value, path: &str, out: &mut Vec<RuleCondition>) -> Result<()> {
	let obj = raw.as_object().ok_or_else(|| invalid(path, "date_range must be an object."))?;

	reject_unknown_keys(obj, path, &["start", "end"])?;

	if let Some(start) = non_null(obj, "start") {
		let start_path = format!("{path}.start");
		let text = expect_str(start, &start_path)?;

		out.push(RuleCondition::TakenFrom(parse_bound(text, &start_path, Bound::Start)?));
	}
	if let Some(end) = non_null(obj, "end") {
		let end_path = format!("{path}.end");
		let text = expect_str(end, &end_path)?;

		out.push(RuleCondition::TakenTo(parse_bound(text, &end_path, Bound::End)?));
	}

	Ok(())
}

fn parse_location(raw: &Value, path: &str) -> Result<LocationRule> {
	let obj = raw.as_object().ok_or_else(|| invalid(path, "location must be an object."))?;

	reject_unknown_keys(obj, path, &["lat", "lon", "radius_km"])?;

	let lat = required_number(obj, "lat", path)?;
	let lon = required_number(obj, "lon", path)?;
	let radius_km = match non_null(obj, "radius_km") {
		Some(value) => expect_number(value, &format!("{path}.radius_km"))?,
		None => DEFAULT_RADIUS_KM,
	};

	if !(-90.0..=90.0).contains(&lat) {
		return Err(unusable(&format!("{path}.lat"), "lat must be in the range -90 to 90."));
	}
	if !(-180.0..=180.0).contains(&lon) {
		return Err(unusable(&format!("{path}.lon"), "lon must be in the range -180 to 180."));
	}
	if radius_km <= 0.0 {
		return Err(unusable(&format!("{path}.radius_km"), "radius_km must be greater than zero."));
	}

	Ok(LocationRule { lat, lon, radius_km })
}

#[derive(Clone, Copy)]
enum Bound {
	Start,
	End,
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates. A bare end date covers the whole day.
fn parse_bound(text: &str, path: &str, bound: Bound) -> Result<OffsetDateTime> {
	let text = text.trim();

	if let Ok(ts) = OffsetDateTime::parse(text, &Rfc3339) {
		return Ok(ts);
	}

	let date = Date::parse(text, format_description!("[year]-[month]-[day]")).map_err(|_| {
		unusable(path, "value must be an RFC 3339 timestamp or a YYYY-MM-DD date.")
	})?;
	let time = match bound {
		Bound::Start => Time::MIDNIGHT,
		Bound::End => Time::from_hms_nano(23, 59, 59, 999_999_999)
			.map_err(|_| unusable(path, "value is out of range."))?,
	};

	Ok(PrimitiveDateTime::new(date, time).assume_utc())
}

fn parse_string_list(raw: &Value, path: &str) -> Result<Vec<String>> {
	let items = raw.as_array().ok_or_else(|| invalid(path, "value must be an array of strings."))?;
	let mut out = Vec::with_capacity(items.len());

	for (idx, item) in items.iter().enumerate() {
		let text = expect_str(item, &format!("{path}[{idx}]"))?.trim();

		if !text.is_empty() && !out.iter().any(|existing: &String| existing == text) {
			out.push(text.to_string());
		}
	}

	Ok(out)
}

fn reject_unknown_keys(obj: &Map<String, Value>, path: &str, allowed: &[&str]) -> Result<()> {
	for key in obj.keys() {
		if !allowed.contains(&key.as_str()) {
			return Err(invalid(
				&format!("{path}.{key}"),
				&format!("unknown key, expected one of {}.", allowed.join(", ")),
			));
		}
	}

	Ok(())
}

fn non_null<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
	obj.get(key).filter(|value| !value.is_null())
}

fn expect_str<'a>(value: &'a Value, path: &str) -> Result<&'a str> {
	value.as_str().ok_or_else(|| invalid(path, "value must be a string."))
}

fn expect_number(value: &Value, path: &str) -> Result<f64> {
	value
		.as_f64()
		.filter(|number| number.is_finite())
		.ok_or_else(|| invalid(path, "value must be a finite number."))
}

fn required_number(obj: &Map<String, Value>, key: &str, path: &str) -> Result<f64> {
	let key_path = format!("{path}.{key}");
	let value = non_null(obj, key).ok_or_else(|| invalid(&key_path, "value is required."))?;

	expect_number(value, &key_path)
}

fn rfc3339_value(ts: OffsetDateTime) -> Value {
	ts.format(&Rfc3339).map(Value::from).unwrap_or(Value::Null)
}

fn invalid(path: &str, message: &str) -> Error {
	Error::InvalidRule { path: path.to_string(), message: message.to_string() }
}

fn unusable(path: &str, message: &str) -> Error {
	Error::InvalidRuleValue { path: path.to_string(), message: message.to_string() }
}
