use arcana_api::{ActivityFilter, CollectionFilter, Uuid};
use sqlx::{postgres::PgArguments, query::Query, Postgres};

pub enum Bind {
    Uuid(Uuid),
    Uuids(Vec<Uuid>),
    String(String),
    Strings(Vec<String>),
}

#[derive(Default)]
pub struct Sql {
    pub where_clause: String,
    pub binds: Vec<Bind>,
}

impl Sql {
    /// Adds a Bind, returning the index that should be used to refer to it assuming the first bind is at index first_bind_idx
    fn add_bind(&mut self, first_bind_idx: usize, b: Bind) -> usize {
        let res = first_bind_idx + self.binds.len();
        self.binds.push(b);
        res
    }

    /// Appends ` AND <cond>`, `cond` being built from the index of the new bind
    fn and(&mut self, first_bind_idx: usize, b: Bind, cond: impl FnOnce(usize) -> String) {
        let idx = self.add_bind(first_bind_idx, b);
        self.where_clause.push_str(" AND ");
        self.where_clause.push_str(&cond(idx));
    }

    pub fn bind_to<'q>(
        self,
        mut q: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        for b in self.binds {
            q = match b {
                Bind::Uuid(u) => q.bind(u),
                Bind::Uuids(u) => q.bind(u),
                Bind::String(s) => q.bind(s),
                Bind::Strings(s) => q.bind(s),
            };
        }
        q
    }
}

/// Assumes the activities table is in scope unaliased
pub fn activity_filter(f: &ActivityFilter, first_bind_idx: usize) -> Sql {
    let mut res = Sql {
        where_clause: String::from("true"),
        binds: Vec::new(),
    };
    if let Some(kinds) = &f.kinds {
        let kinds = kinds.iter().map(|k| String::from(k.as_str())).collect();
        res.and(first_bind_idx, Bind::Strings(kinds), |i| {
            format!("type = ANY(${i})")
        });
    }
    if let Some(actors) = &f.actors {
        let actors = actors.iter().map(|u| u.0).collect();
        res.and(first_bind_idx, Bind::Uuids(actors), |i| {
            format!("user_id = ANY(${i})")
        });
    }
    if let Some(c) = f.collection {
        res.and(first_bind_idx, Bind::Uuid(c.0), |i| {
            format!("collection_id = ${i}")
        });
    }
    if let Some(c) = f.comment {
        res.and(first_bind_idx, Bind::Uuid(c.0), |i| {
            format!("comment_id = ${i}")
        });
    }
    res
}

/// Assumes the collections table is in scope unaliased
pub fn collection_filter(f: &CollectionFilter, first_bind_idx: usize) -> Sql {
    let mut res = Sql {
        where_clause: String::from("true"),
        binds: Vec::new(),
    };
    if let Some(owner) = f.owner {
        res.and(first_bind_idx, Bind::Uuid(owner.0), |i| {
            format!("owner_id = ${i}")
        });
    }
    if let Some(v) = f.visibility {
        res.and(first_bind_idx, Bind::String(String::from(v.as_str())), |i| {
            format!("visibility = ${i}")
        });
    }
    res
}

/// Turns user input into an ILIKE pattern matching it as a plain substring
pub fn contains_pattern(s: &str) -> String {
    let mut res = String::with_capacity(s.len() + 2);
    res.push('%');
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            res.push('\\');
        }
        res.push(c);
    }
    res.push('%');
    res
}

#[cfg(test)]
mod tests {
    use arcana_api::{ActivityKind, CollectionId, CommentId, UserId};

    use super::*;

    #[test]
    fn empty_filters_match_everything() {
        let sql = activity_filter(&ActivityFilter::default(), 1);
        assert_eq!(sql.where_clause, "true");
        assert!(sql.binds.is_empty());
        let sql = collection_filter(&CollectionFilter::default(), 1);
        assert_eq!(sql.where_clause, "true");
    }

    #[test]
    fn activity_filter_numbers_binds_in_order() {
        let sql = activity_filter(
            &ActivityFilter {
                kinds: Some(vec![ActivityKind::Comment, ActivityKind::Reply]),
                actors: Some(vec![UserId::new()]),
                collection: Some(CollectionId::new()),
                comment: Some(CommentId::new()),
            },
            3,
        );
        assert_eq!(
            sql.where_clause,
            "true AND type = ANY($3) AND user_id = ANY($4) AND collection_id = $5 AND comment_id = $6"
        );
        assert_eq!(sql.binds.len(), 4);
        assert!(matches!(&sql.binds[0], Bind::Strings(k) if k == &["comment", "reply"]));
    }

    #[test]
    fn collection_filter_binds_visibility_as_text() {
        let sql = collection_filter(&CollectionFilter::public(), 1);
        assert_eq!(sql.where_clause, "true AND visibility = $1");
        assert!(matches!(&sql.binds[0], Bind::String(v) if v == "public"));
    }

    #[test]
    fn patterns_escape_wildcards() {
        assert_eq!(contains_pattern("sci"), "%sci%");
        assert_eq!(contains_pattern("100%_a\\b"), "%100\\%\\_a\\\\b%");
        // Regex syntax is not interpreted
        assert_eq!(contains_pattern("a.*("), "%a.*(%");
    }
}
