use std::fmt;

/// A point and radius for `media/search`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Radius {
    pub latitude: f64,
    pub longitude: f64,
    pub distance_m: u32,
}

/// One independent query target. Users and locations hold already-resolved ids.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Tag(String),
    User(String),
    Location(String),
    Radius(Radius),
}

/// How a query's freshness cursor is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// `min_tag_id`, reported by the API in the pagination block.
    TagCursor,
    /// `min_timestamp`, derived from item `created_time` values.
    Timestamp,
}

impl Query {
    pub fn flavor(&self) -> Flavor {
        match self {
            Query::Tag(_) => Flavor::TagCursor,
            Query::User(_) | Query::Location(_) | Query::Radius(_) => Flavor::Timestamp,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Tag(tag) => write!(f, "#{tag}"),
            Query::User(id) => write!(f, "user:{id}"),
            Query::Location(id) => write!(f, "location:{id}"),
            Query::Radius(r) => write!(f, "{},{}~{}m", r.latitude, r.longitude, r.distance_m),
        }
    }
}

/// Ordered, fixed list of queries. Positions are the query indices used everywhere else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySet(Vec<Query>);

impl QuerySet {
    pub fn new(queries: Vec<Query>) -> Self {
        Self(queries)
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tags.into_iter().map(|t| Query::Tag(t.into())).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Query> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Query> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Query> {
        self.0
    }
}

impl From<Vec<Query>> for QuerySet {
    fn from(queries: Vec<Query>) -> Self {
        Self(queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_cursor_flavored() {
        assert_eq!(Query::Tag("sunset".into()).flavor(), Flavor::TagCursor);
        assert_eq!(Query::User("123".into()).flavor(), Flavor::Timestamp);
        let r = Query::Radius(Radius {
            latitude: 1.0,
            longitude: 2.0,
            distance_m: 500,
        });
        assert_eq!(r.flavor(), Flavor::Timestamp);
    }

    #[test]
    fn query_set_preserves_order() {
        let set = QuerySet::tags(["a", "b", "c"]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(1), Some(&Query::Tag("b".into())));
        assert!(set.get(3).is_none());
    }
}
