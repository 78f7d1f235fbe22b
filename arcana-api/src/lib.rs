use chrono::Utc;

mod activity;
mod auth;
mod collection;
mod comment;
mod db;
mod element;
mod error;
mod like;
mod message;
mod metadata;
mod sweep;
mod user;

pub use activity::*;
pub use auth::*;
pub use collection::*;
pub use comment::*;
pub use db::*;
pub use element::*;
pub use error::*;
pub use like::*;
pub use message::*;
pub use metadata::*;
pub use sweep::*;
pub use user::*;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Clone,
            Copy,
            Debug,
            Eq,
            Hash,
            Ord,
            PartialEq,
            PartialOrd,
            serde::Deserialize,
            serde::Serialize,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> $name {
                $name(Uuid::new_v4())
            }

            pub fn stub() -> $name {
                $name(STUB_UUID)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> $name {
                $name(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(UserId);
id_type!(CollectionId);
id_type!(ElementId);
id_type!(CommentId);
id_type!(ActivityId);
id_type!(LikeId);
id_type!(MessageId);

pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}

/// Trims a required text field, failing if nothing is left
pub fn required(s: &str) -> Result<&str, Error> {
    validate_string(s)?;
    match s.trim() {
        "" => Err(Error::MissingFields),
        s => Ok(s),
    }
}

/// Lowercases and trims usernames and emails, which are compared case-insensitively
pub fn normalize_login(s: &str) -> String {
    s.trim().to_lowercase()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Page {
    pub page: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(page: u64, limit: u64) -> Page {
        Page {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn skip(&self) -> usize {
        usize::try_from((self.page - 1).saturating_mul(self.limit)).unwrap_or(usize::MAX)
    }

    pub fn take(&self) -> usize {
        usize::try_from(self.limit).unwrap_or(usize::MAX)
    }

    pub fn describe(&self, total: u64) -> Pagination {
        Pagination {
            total,
            page: self.page,
            limit: self.limit,
            pages: match total {
                0 => 0,
                t => (t - 1) / self.limit + 1,
            },
        }
    }
}

/// Raw `?page=&limit=` parameters. Anything that is not a positive integer falls back to
/// the default.
#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    pub fn resolve(&self, default_limit: u64) -> Page {
        // Leading digits count, "7abc" reads as 7
        fn positive(v: &Option<String>) -> Option<u64> {
            let v = v.as_deref()?.trim_start();
            let v = v.strip_prefix('+').unwrap_or(v);
            let digits = v
                .find(|c: char| !c.is_ascii_digit())
                .map_or(v, |end| &v[..end]);
            digits.parse::<u64>().ok().filter(|v| *v >= 1)
        }
        Page::new(
            positive(&self.page).unwrap_or(1),
            positive(&self.limit).unwrap_or(default_limit),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_defaults() {
        let q = PageQuery::default();
        assert_eq!(q.resolve(50), Page { page: 1, limit: 50 });

        let q = PageQuery {
            page: Some(String::from("0")),
            limit: Some(String::from("abc")),
        };
        assert_eq!(q.resolve(20), Page { page: 1, limit: 20 });

        let q = PageQuery {
            page: Some(String::from("-3")),
            limit: Some(String::from("7")),
        };
        assert_eq!(q.resolve(20), Page { page: 1, limit: 7 });

        let q = PageQuery {
            page: Some(String::from("7abc")),
            limit: Some(String::from(" 12.5")),
        };
        assert_eq!(q.resolve(20), Page { page: 7, limit: 12 });

        let q = PageQuery {
            page: Some(String::from("+2")),
            limit: Some(String::from("x12")),
        };
        assert_eq!(q.resolve(20), Page { page: 2, limit: 20 });
    }

    #[test]
    fn pagination_rounds_pages_up() {
        let p = Page::new(2, 3);
        assert_eq!(p.skip(), 3);
        assert_eq!(
            p.describe(7),
            Pagination {
                total: 7,
                page: 2,
                limit: 3,
                pages: 3,
            }
        );
        assert_eq!(p.describe(0).pages, 0);
    }

    #[test]
    fn required_trims() {
        assert_eq!(required("  hello "), Ok("hello"));
        assert_eq!(required("   "), Err(Error::MissingFields));
        assert!(matches!(
            required("a\0b"),
            Err(Error::NullByteInString(_))
        ));
    }
}
