use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// AttributeValue – a single value in a persisted series record
// ---------------------------------------------------------------------------

/// A dynamically-typed record value: scalars, strings, 1-D numeric arrays and
/// nested maps (used for `style`).
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<f64>),
    Map(BTreeMap<String, AttributeValue>),
    Null,
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{s}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            AttributeValue::Float(v) => write!(f, "{v:.4}"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Array(values) => write!(f, "<array of {}>", values.len()),
            AttributeValue::Map(map) => write!(f, "<map of {}>", map.len()),
            AttributeValue::Null => write!(f, "<null>"),
        }
    }
}

impl AttributeValue {
    /// Try to interpret the value as an `f64` scalar.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Integers, and floats with no fractional part, as `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            AttributeValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// GroupId – channel / axis-set identifier
// ---------------------------------------------------------------------------

/// Identifies the logical channel a series belongs to.
///
/// Integer groups order numerically and label groups lexically; mixing both
/// kinds in one collection orders every integer before every label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupId {
    Index(i64),
    Label(String),
}

impl Default for GroupId {
    fn default() -> Self {
        GroupId::Index(0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupId::Index(i) => write!(f, "{i}"),
            GroupId::Label(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for GroupId {
    fn from(value: i64) -> Self {
        GroupId::Index(value)
    }
}

impl From<&str> for GroupId {
    fn from(value: &str) -> Self {
        GroupId::Label(value.to_string())
    }
}

impl GroupId {
    /// Parse a command-line style group token: integers become `Index`.
    pub fn parse(token: &str) -> GroupId {
        match token.trim().parse::<i64>() {
            Ok(i) => GroupId::Index(i),
            Err(_) => GroupId::Label(token.trim().to_string()),
        }
    }

    fn to_value(&self) -> AttributeValue {
        match self {
            GroupId::Index(i) => AttributeValue::Integer(*i),
            GroupId::Label(s) => AttributeValue::String(s.clone()),
        }
    }

    fn from_value(value: &AttributeValue) -> Option<GroupId> {
        if let Some(i) = value.as_i64() {
            return Some(GroupId::Index(i));
        }
        value.as_str().map(|s| GroupId::Label(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Style – sparse presentation attributes with alias canonicalisation
// ---------------------------------------------------------------------------

/// Canonical presentation keys. Every alias is folded into one of these when
/// it enters a [`Style`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StyleKey {
    Color,
    LineStyle,
    LineWidth,
    Marker,
    MarkerSize,
    MarkerEdgeWidth,
    MarkerEdgeColor,
    MarkerFaceColor,
}

impl StyleKey {
    pub const ALL: [StyleKey; 8] = [
        StyleKey::Color,
        StyleKey::LineStyle,
        StyleKey::LineWidth,
        StyleKey::Marker,
        StyleKey::MarkerSize,
        StyleKey::MarkerEdgeWidth,
        StyleKey::MarkerEdgeColor,
        StyleKey::MarkerFaceColor,
    ];

    /// The key written to persisted records.
    pub fn canonical(self) -> &'static str {
        self.aliases()[0]
    }

    /// Canonical name first, then the recognised short forms.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            StyleKey::Color => &["color", "c"],
            StyleKey::LineStyle => &["linestyle", "ls"],
            StyleKey::LineWidth => &["linewidth", "lw"],
            StyleKey::Marker => &["marker"],
            StyleKey::MarkerSize => &["markersize", "ms"],
            StyleKey::MarkerEdgeWidth => &["markeredgewidth", "mew"],
            StyleKey::MarkerEdgeColor => &["markeredgecolor", "mec"],
            StyleKey::MarkerFaceColor => &["markerfacecolor", "mfc"],
        }
    }

    pub fn from_alias(alias: &str) -> Option<StyleKey> {
        let alias = alias.trim().to_ascii_lowercase();
        StyleKey::ALL
            .into_iter()
            .find(|key| key.aliases().contains(&alias.as_str()))
    }
}

/// Sparse style map. Keys that are not presentation aliases are kept verbatim
/// in `other` so they survive a round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Style {
    entries: BTreeMap<StyleKey, AttributeValue>,
    other: BTreeMap<String, AttributeValue>,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.other.is_empty()
    }

    /// Set a value under any alias; the alias is canonicalised here.
    pub fn set(&mut self, key: &str, value: AttributeValue) {
        match StyleKey::from_alias(key) {
            Some(k) => {
                self.entries.insert(k, value);
            }
            None => {
                self.other.insert(key.to_string(), value);
            }
        }
    }

    /// Look up a value by any alias of its group.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        match StyleKey::from_alias(key) {
            Some(k) => self.entries.get(&k),
            None => self.other.get(key),
        }
    }

    pub fn get_key(&self, key: StyleKey) -> Option<&AttributeValue> {
        self.entries.get(&key)
    }

    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        match StyleKey::from_alias(key) {
            Some(k) => self.entries.remove(&k),
            None => self.other.remove(key),
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, AttributeValue> {
        let mut map: BTreeMap<String, AttributeValue> = self.other.clone();
        for (k, v) in &self.entries {
            map.insert(k.canonical().to_string(), v.clone());
        }
        map
    }

    /// Build from a raw map. When several aliases of one key are present the
    /// canonical spelling wins, then the first alias in declaration order.
    pub fn from_map(map: &BTreeMap<String, AttributeValue>) -> Self {
        let mut style = Style::default();
        for key in StyleKey::ALL {
            if let Some(v) = key.aliases().iter().find_map(|a| map.get(*a)) {
                style.entries.insert(key, v.clone());
            }
        }
        for (k, v) in map {
            if StyleKey::from_alias(k).is_none() {
                style.other.insert(k.clone(), v.clone());
            }
        }
        style
    }
}

// ---------------------------------------------------------------------------
// Series – one (x, y) trace with its addressing attributes
// ---------------------------------------------------------------------------

/// The x component of a series: explicit samples or a uniform sample interval.
#[derive(Debug, Clone, PartialEq)]
pub enum XData {
    Values(Vec<f64>),
    Interval(f64),
    /// An interval written as an integer, e.g. one unit per sample.
    IntegerInterval(i64),
}

impl XData {
    /// The uniform sample spacing, when x is given as an interval.
    pub fn interval(&self) -> Option<f64> {
        match self {
            XData::Values(_) => None,
            XData::Interval(dt) => Some(*dt),
            XData::IntegerInterval(dt) => Some(*dt as f64),
        }
    }

    fn to_value(&self) -> AttributeValue {
        match self {
            XData::Values(v) => AttributeValue::Array(v.clone()),
            XData::Interval(dt) => AttributeValue::Float(*dt),
            XData::IntegerInterval(dt) => AttributeValue::Integer(*dt),
        }
    }
}

/// How `y` was stored. A 0-d `y` reads as a one-sample array and is written
/// back as the same scalar while it still holds exactly one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum YShape {
    #[default]
    Array,
    Float,
    Integer,
}

/// A single trace. Optional fields stay `None` when the source record omitted
/// them so the record's key set survives a round trip; resolved views live in
/// [`crate::data::resolver`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub x: Option<XData>,
    pub y: Option<Vec<f64>>,
    pub y_shape: YShape,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    pub episode: Option<i64>,
    pub group: Option<GroupId>,
    pub name: Option<String>,
    pub style: Option<Style>,
    /// Any other record key, e.g. `labels` annotations.
    pub extra: BTreeMap<String, AttributeValue>,
}

/// Flat key → value form used by the persistence layer.
pub type Record = BTreeMap<String, AttributeValue>;

pub const CORE_KEYS: [&str; 8] = [
    "x", "y", "xlabel", "ylabel", "episode", "group", "name", "style",
];

impl Series {
    pub fn from_y(y: Vec<f64>) -> Self {
        Series {
            y: Some(y),
            ..Default::default()
        }
    }

    pub fn with_x(mut self, x: Vec<f64>) -> Self {
        self.x = Some(XData::Values(x));
        self
    }

    pub fn with_interval(mut self, dt: f64) -> Self {
        self.x = Some(XData::Interval(dt));
        self
    }

    pub fn with_episode(mut self, episode: i64) -> Self {
        self.episode = Some(episode);
        self
    }

    pub fn with_group(mut self, group: impl Into<GroupId>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Whether the series has usable y data.
    pub fn has_y(&self) -> bool {
        self.y.as_ref().is_some_and(|y| !y.is_empty())
    }

    /// Flatten into a persistence record, emitting only the keys that are set.
    pub fn to_record(&self) -> Record {
        let mut rec = self.extra.clone();
        if let Some(x) = &self.x {
            rec.insert("x".into(), x.to_value());
        }
        if let Some(y) = &self.y {
            let value = match (self.y_shape, y.as_slice()) {
                (YShape::Float, [v]) => AttributeValue::Float(*v),
                (YShape::Integer, [v]) if v.fract() == 0.0 => AttributeValue::Integer(*v as i64),
                _ => AttributeValue::Array(y.clone()),
            };
            rec.insert("y".into(), value);
        }
        if let Some(s) = &self.xlabel {
            rec.insert("xlabel".into(), AttributeValue::String(s.clone()));
        }
        if let Some(s) = &self.ylabel {
            rec.insert("ylabel".into(), AttributeValue::String(s.clone()));
        }
        if let Some(e) = self.episode {
            rec.insert("episode".into(), AttributeValue::Integer(e));
        }
        if let Some(g) = &self.group {
            rec.insert("group".into(), g.to_value());
        }
        if let Some(s) = &self.name {
            rec.insert("name".into(), AttributeValue::String(s.clone()));
        }
        if let Some(style) = &self.style {
            rec.insert("style".into(), AttributeValue::Map(style.to_map()));
        }
        rec
    }

    /// Build from a persistence record. Core keys holding a value of the wrong
    /// kind are kept in `extra` untouched, so a malformed `y` reads as "no y"
    /// without losing data.
    pub fn from_record(mut rec: Record) -> Self {
        let mut series = Series::default();

        if let Some(v) = rec.remove("x") {
            match v {
                AttributeValue::Array(values) => series.x = Some(XData::Values(values)),
                AttributeValue::Integer(dt) => series.x = Some(XData::IntegerInterval(dt)),
                AttributeValue::Float(dt) => series.x = Some(XData::Interval(dt)),
                other => {
                    series.extra.insert("x".into(), other);
                }
            }
        }
        if let Some(v) = rec.remove("y") {
            match v {
                AttributeValue::Array(values) => series.y = Some(values),
                // 0-d arrays collapse to scalars on disk
                AttributeValue::Integer(y) => {
                    series.y = Some(vec![y as f64]);
                    series.y_shape = YShape::Integer;
                }
                AttributeValue::Float(y) => {
                    series.y = Some(vec![y]);
                    series.y_shape = YShape::Float;
                }
                other => {
                    series.extra.insert("y".into(), other);
                }
            }
        }
        for (key, slot) in [("xlabel", &mut series.xlabel), ("ylabel", &mut series.ylabel)] {
            if let Some(v) = rec.remove(key) {
                match v {
                    AttributeValue::String(s) => *slot = Some(s),
                    other => {
                        series.extra.insert(key.into(), other);
                    }
                }
            }
        }
        if let Some(v) = rec.remove("episode") {
            match v.as_i64() {
                Some(e) => series.episode = Some(e),
                None => {
                    series.extra.insert("episode".into(), v);
                }
            }
        }
        if let Some(v) = rec.remove("group") {
            match GroupId::from_value(&v) {
                Some(g) => series.group = Some(g),
                None => {
                    series.extra.insert("group".into(), v);
                }
            }
        }
        if let Some(v) = rec.remove("name") {
            match v {
                AttributeValue::String(s) => series.name = Some(s),
                other => {
                    series.extra.insert("name".into(), other);
                }
            }
        }
        if let Some(v) = rec.remove("style") {
            match v {
                AttributeValue::Map(map) => series.style = Some(Style::from_map(&map)),
                other => {
                    series.extra.insert("style".into(), other);
                }
            }
        }

        series.extra.extend(rec);
        series
    }
}
