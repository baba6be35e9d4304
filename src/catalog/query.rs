//! Parameterized query construction for the mix table.
//!
//! The builder accumulates WHERE fragments and renders one SQL string with
//! positional `?` placeholders. Callers bind parameters in the same order the
//! fragments were added; `parameter_count` reports how many are expected.

use super::models::SelectionCriteria;

/// Ordering modes for catalog queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    #[default]
    None,
    Title,
    Artist,
    Genre,
    LastPlayed,
    PlayCount,
    DateAdded,
    Random,
}

/// Fluent builder for SELECT queries over the mixes table.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    conditions: Vec<&'static str>,
    order_clause: String,
    limit_clause: String,
    parameter_count: usize,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude soft-deleted rows.
    pub fn where_not_deleted(&mut self) -> &mut Self {
        self.conditions.push("is_deleted = 0");
        self
    }

    /// Genre equality, case-insensitive. Adds one parameter.
    pub fn where_genre(&mut self) -> &mut Self {
        self.conditions.push("genre = ? COLLATE NOCASE");
        self.parameter_count += 1;
        self
    }

    /// Artist equality, exact. Adds one parameter.
    pub fn where_artist(&mut self) -> &mut Self {
        self.conditions.push("artist = ?");
        self.parameter_count += 1;
        self
    }

    /// Id equality. Adds one parameter.
    pub fn where_id(&mut self) -> &mut Self {
        self.conditions.push("id = ?");
        self.parameter_count += 1;
        self
    }

    /// Id inequality (exclude one entry). Adds one parameter.
    pub fn where_not_id(&mut self) -> &mut Self {
        self.conditions.push("id != ?");
        self.parameter_count += 1;
        self
    }

    pub fn where_favorites(&mut self) -> &mut Self {
        self.conditions.push("is_favorite = 1");
        self
    }

    pub fn where_downloaded(&mut self) -> &mut Self {
        self.conditions
            .push("local_path IS NOT NULL AND local_path != ''");
        self
    }

    pub fn where_has_been_played(&mut self) -> &mut Self {
        self.conditions.push("last_played IS NOT NULL");
        self
    }

    pub fn order_by(&mut self, order: OrderBy, ascending: bool) -> &mut Self {
        let direction = if ascending { "ASC" } else { "DESC" };
        self.order_clause = match order {
            OrderBy::Title => format!("ORDER BY title {}", direction),
            OrderBy::Artist => format!("ORDER BY artist {0}, title {0}", direction),
            OrderBy::Genre => format!("ORDER BY genre {0}, title {0}", direction),
            OrderBy::LastPlayed => format!("ORDER BY last_played {}", direction),
            OrderBy::PlayCount => format!("ORDER BY play_count {}", direction),
            OrderBy::DateAdded => format!("ORDER BY date_added {}", direction),
            OrderBy::Random => "ORDER BY RANDOM()".to_string(),
            OrderBy::None => String::new(),
        };
        self
    }

    /// Freshness ordering for smart selection: never-played rows first, then
    /// oldest last-played, then fewest plays, with a random tiebreak.
    pub fn order_by_smart(&mut self, prefer_unplayed: bool, prefer_least_played: bool) -> &mut Self {
        let mut terms: Vec<&str> = Vec::new();
        if prefer_unplayed {
            terms.push("CASE WHEN last_played IS NULL THEN 0 ELSE 1 END");
        }
        if prefer_least_played {
            terms.push("last_played ASC");
            terms.push("play_count ASC");
        }
        terms.push("RANDOM()");
        self.order_clause = format!("ORDER BY {}", terms.join(", "));
        self
    }

    /// Cap the number of rows; zero or negative leaves the query unlimited.
    pub fn limit(&mut self, limit: i64) -> &mut Self {
        if limit > 0 {
            self.limit_clause = format!("LIMIT {}", limit);
        }
        self
    }

    pub fn build(&self) -> String {
        let mut query = String::from("SELECT * FROM mixes");

        if !self.conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&self.conditions.join(" AND "));
        }

        if !self.order_clause.is_empty() {
            query.push(' ');
            query.push_str(&self.order_clause);
        }

        if !self.limit_clause.is_empty() {
            query.push(' ');
            query.push_str(&self.limit_clause);
        }

        query
    }

    /// Number of positional parameters the caller must bind, in the order the
    /// WHERE fragments were added.
    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    pub fn reset(&mut self) -> &mut Self {
        self.conditions.clear();
        self.order_clause.clear();
        self.limit_clause.clear();
        self.parameter_count = 0;
        self
    }

    /// Apply the filters of a `SelectionCriteria`, in the canonical order
    /// matching `params_from_criteria`.
    pub fn apply_criteria(&mut self, criteria: &SelectionCriteria) -> &mut Self {
        if !criteria.include_deleted {
            self.where_not_deleted();
        }
        if !criteria.genre.is_empty() {
            self.where_genre();
        }
        if !criteria.artist.is_empty() {
            self.where_artist();
        }
        if !criteria.exclude_id.is_empty() {
            self.where_not_id();
        }
        if criteria.favorites_only {
            self.where_favorites();
        }
        if criteria.downloaded_only {
            self.where_downloaded();
        }
        self
    }

    /// Render a complete query for a criteria + ordering pair.
    pub fn build_query(criteria: &SelectionCriteria, order: OrderBy) -> String {
        let mut builder = QueryBuilder::new();
        builder.apply_criteria(criteria);
        builder.order_by(order, true);
        if criteria.limit > 0 {
            builder.limit(criteria.limit);
        }
        builder.build()
    }
}

/// The parameter values for a criteria-built query, in binding order.
pub fn params_from_criteria(criteria: &SelectionCriteria) -> Vec<String> {
    let mut params = Vec::new();
    if !criteria.genre.is_empty() {
        params.push(criteria.genre.clone());
    }
    if !criteria.artist.is_empty() {
        params.push(criteria.artist.clone());
    }
    if !criteria.exclude_id.is_empty() {
        params.push(criteria.exclude_id.clone());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_select() {
        let builder = QueryBuilder::new();
        assert_eq!(builder.build(), "SELECT * FROM mixes");
        assert_eq!(builder.parameter_count(), 0);
    }

    #[test]
    fn test_conditions_joined_with_and() {
        let mut builder = QueryBuilder::new();
        builder.where_not_deleted().where_downloaded();
        assert_eq!(
            builder.build(),
            "SELECT * FROM mixes WHERE is_deleted = 0 AND local_path IS NOT NULL AND local_path != ''"
        );
    }

    #[test]
    fn test_parameter_count_tracks_placeholder_fragments() {
        let mut builder = QueryBuilder::new();
        builder
            .where_genre()
            .where_artist()
            .where_not_id()
            .where_id();
        assert_eq!(builder.parameter_count(), 4);

        // Fragments without placeholders do not count.
        builder.where_favorites().where_has_been_played();
        assert_eq!(builder.parameter_count(), 4);
    }

    #[test]
    fn test_order_by_variants() {
        let mut builder = QueryBuilder::new();
        builder.order_by(OrderBy::Title, false);
        assert_eq!(builder.build(), "SELECT * FROM mixes ORDER BY title DESC");

        builder.reset();
        builder.order_by(OrderBy::Artist, true);
        assert_eq!(
            builder.build(),
            "SELECT * FROM mixes ORDER BY artist ASC, title ASC"
        );

        builder.reset();
        builder.order_by(OrderBy::Random, true);
        assert_eq!(builder.build(), "SELECT * FROM mixes ORDER BY RANDOM()");

        builder.reset();
        builder.order_by(OrderBy::None, true);
        assert_eq!(builder.build(), "SELECT * FROM mixes");
    }

    #[test]
    fn test_limit_ignored_when_not_positive() {
        let mut builder = QueryBuilder::new();
        builder.limit(0);
        assert_eq!(builder.build(), "SELECT * FROM mixes");
        builder.limit(-3);
        assert_eq!(builder.build(), "SELECT * FROM mixes");
        builder.limit(5);
        assert_eq!(builder.build(), "SELECT * FROM mixes LIMIT 5");
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut builder = QueryBuilder::new();
        builder.where_genre().order_by(OrderBy::Title, true).limit(1);
        builder.reset();
        assert_eq!(builder.build(), "SELECT * FROM mixes");
        assert_eq!(builder.parameter_count(), 0);
    }

    #[test]
    fn test_smart_ordering_full() {
        let mut builder = QueryBuilder::new();
        builder.where_not_deleted().order_by_smart(true, true).limit(1);
        assert_eq!(
            builder.build(),
            "SELECT * FROM mixes WHERE is_deleted = 0 \
             ORDER BY CASE WHEN last_played IS NULL THEN 0 ELSE 1 END, \
             last_played ASC, play_count ASC, RANDOM() LIMIT 1"
        );
    }

    #[test]
    fn test_smart_ordering_degenerates_to_random() {
        let mut builder = QueryBuilder::new();
        builder.order_by_smart(false, false);
        assert_eq!(builder.build(), "SELECT * FROM mixes ORDER BY RANDOM()");
    }

    #[test]
    fn test_build_query_always_filters_deleted_unless_opted_in() {
        let criteria = SelectionCriteria::default();
        let query = QueryBuilder::build_query(&criteria, OrderBy::None);
        assert_eq!(query, "SELECT * FROM mixes WHERE is_deleted = 0");

        let criteria = SelectionCriteria {
            include_deleted: true,
            ..Default::default()
        };
        let query = QueryBuilder::build_query(&criteria, OrderBy::None);
        assert_eq!(query, "SELECT * FROM mixes");
    }

    #[test]
    fn test_build_query_full_criteria() {
        let criteria = SelectionCriteria {
            genre: "Techno".to_string(),
            artist: "DJ Test".to_string(),
            exclude_id: "mix-1".to_string(),
            favorites_only: true,
            downloaded_only: true,
            include_deleted: false,
            limit: 10,
        };
        let query = QueryBuilder::build_query(&criteria, OrderBy::Random);
        assert_eq!(
            query,
            "SELECT * FROM mixes WHERE is_deleted = 0 AND genre = ? COLLATE NOCASE \
             AND artist = ? AND id != ? AND is_favorite = 1 \
             AND local_path IS NOT NULL AND local_path != '' ORDER BY RANDOM() LIMIT 10"
        );
        assert_eq!(
            params_from_criteria(&criteria),
            vec!["Techno".to_string(), "DJ Test".to_string(), "mix-1".to_string()]
        );
    }

    #[test]
    fn test_params_match_fragment_order() {
        let criteria = SelectionCriteria {
            genre: "House".to_string(),
            exclude_id: "abc".to_string(),
            ..Default::default()
        };
        let mut builder = QueryBuilder::new();
        builder.apply_criteria(&criteria);
        assert_eq!(builder.parameter_count(), 2);
        assert_eq!(
            params_from_criteria(&criteria),
            vec!["House".to_string(), "abc".to_string()]
        );
    }
}
