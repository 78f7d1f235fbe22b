use anyhow::Context;
use arcana_api::{MediaKind, MediaMetadata};
use serde::Deserialize;

const TMDB_URL: &str = "https://api.themoviedb.org/3/search";
const TMDB_POSTER_PREFIX: &str = "https://image.tmdb.org/t/p/w500";
const GOOGLE_BOOKS_URL: &str = "https://www.googleapis.com/books/v1/volumes";
const ITUNES_URL: &str = "https://itunes.apple.com/search";
const RAWG_URL: &str = "https://api.rawg.io/api/games";

/// Client for the third-party catalogues backing autocompletion
#[derive(Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    tmdb_key: Option<String>,
    rawg_key: Option<String>,
}

impl MetadataClient {
    pub fn new(tmdb_key: Option<String>, rawg_key: Option<String>) -> MetadataClient {
        MetadataClient {
            http: reqwest::Client::new(),
            tmdb_key,
            rawg_key,
        }
    }

    /// Candidates for `term`; an empty result means nothing was found
    pub async fn lookup(&self, kind: MediaKind, term: &str) -> anyhow::Result<Vec<MediaMetadata>> {
        match kind {
            MediaKind::Movie => Ok(tmdb_movies(self.tmdb("movie", term).await?)),
            MediaKind::Serie => Ok(tmdb_series(self.tmdb("tv", term).await?)),
            MediaKind::Book => Ok(google_books(
                self.get(GOOGLE_BOOKS_URL, &[("q", term)]).await?,
            )),
            MediaKind::Music => {
                let albums: ITunesResponse = self.itunes(term, "album").await?;
                if !albums.results.is_empty() {
                    return Ok(itunes(albums));
                }
                Ok(itunes(self.itunes(term, "musicTrack").await?))
            }
            MediaKind::Game => {
                let key = self.rawg_key.as_deref().unwrap_or_default();
                Ok(rawg(
                    self.get(RAWG_URL, &[("key", key), ("search", term)])
                        .await?,
                ))
            }
        }
    }

    async fn tmdb<T: for<'de> Deserialize<'de>>(&self, what: &str, term: &str) -> anyhow::Result<T> {
        let key = self.tmdb_key.as_deref().unwrap_or_default();
        self.get(
            &format!("{TMDB_URL}/{what}"),
            &[("api_key", key), ("query", term)],
        )
        .await
    }

    async fn itunes(&self, term: &str, entity: &str) -> anyhow::Result<ITunesResponse> {
        self.get(
            ITUNES_URL,
            &[
                ("term", term),
                ("media", "music"),
                ("entity", entity),
                ("limit", "10"),
            ],
        )
        .await
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> anyhow::Result<T> {
        self.http
            .get(url)
            .query(params)
            .send()
            .await
            .with_context(|| format!("querying {url}"))?
            .error_for_status()
            .with_context(|| format!("querying {url}"))?
            .json()
            .await
            .with_context(|| format!("parsing response of {url}"))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TmdbResponse<T> {
    results: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TmdbMovie {
    title: String,
    overview: String,
    poster_path: Option<String>,
    release_date: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TmdbSerie {
    name: String,
    overview: String,
    poster_path: Option<String>,
    first_air_date: String,
}

fn tmdb_poster(path: Option<String>) -> String {
    path.map(|p| format!("{TMDB_POSTER_PREFIX}{p}"))
        .unwrap_or_default()
}

fn tmdb_movies(res: TmdbResponse<TmdbMovie>) -> Vec<MediaMetadata> {
    res.results
        .into_iter()
        .map(|m| MediaMetadata {
            title: m.title,
            description: m.overview,
            cover: tmdb_poster(m.poster_path),
            release_date: m.release_date,
            author: Vec::new(),
        })
        .collect()
}

fn tmdb_series(res: TmdbResponse<TmdbSerie>) -> Vec<MediaMetadata> {
    res.results
        .into_iter()
        .map(|s| MediaMetadata {
            title: s.name,
            description: s.overview,
            cover: tmdb_poster(s.poster_path),
            release_date: s.first_air_date,
            author: Vec::new(),
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BooksResponse {
    items: Vec<BookItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BookItem {
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VolumeInfo {
    title: String,
    description: String,
    image_links: Option<ImageLinks>,
    published_date: String,
    authors: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImageLinks {
    thumbnail: String,
}

fn google_books(res: BooksResponse) -> Vec<MediaMetadata> {
    res.items
        .into_iter()
        .map(|b| b.volume_info)
        .map(|b| MediaMetadata {
            title: b.title,
            description: b.description,
            cover: b.image_links.map(|l| l.thumbnail).unwrap_or_default(),
            release_date: b.published_date,
            author: b.authors,
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ITunesResponse {
    results: Vec<ITunesItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ITunesItem {
    collection_name: Option<String>,
    track_name: Option<String>,
    collection_censored_name: String,
    artwork_url100: Option<String>,
    release_date: String,
    artist_name: Option<String>,
}

fn itunes(res: ITunesResponse) -> Vec<MediaMetadata> {
    res.results
        .into_iter()
        .map(|i| MediaMetadata {
            title: i
                .collection_name
                .or(i.track_name)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| String::from("Unknown")),
            description: i.collection_censored_name,
            cover: i
                .artwork_url100
                .map(|a| a.replace("100x100", "500x500"))
                .unwrap_or_default(),
            release_date: i.release_date,
            author: vec![i
                .artist_name
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| String::from("Unknown artist"))],
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawgResponse {
    results: Vec<RawgGame>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawgGame {
    name: String,
    description: String,
    background_image: Option<String>,
    released: Option<String>,
    developers: Vec<RawgDeveloper>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawgDeveloper {
    name: String,
}

fn rawg(res: RawgResponse) -> Vec<MediaMetadata> {
    res.results
        .into_iter()
        .map(|g| MediaMetadata {
            title: g.name,
            description: g.description,
            cover: g.background_image.unwrap_or_default(),
            release_date: g.released.unwrap_or_default(),
            author: g.developers.into_iter().map(|d| d.name).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse<T: for<'de> Deserialize<'de>>(v: serde_json::Value) -> T {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn tmdb_posters_get_the_image_prefix() {
        let res = tmdb_movies(parse(json!({
            "page": 1,
            "results": [
                {"title": "Alien", "overview": "In space", "poster_path": "/a.jpg", "release_date": "1979-05-25"},
                {"title": "No poster", "poster_path": null},
            ],
        })));
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].cover, "https://image.tmdb.org/t/p/w500/a.jpg");
        assert_eq!(res[0].release_date, "1979-05-25");
        assert!(res[0].author.is_empty());
        assert_eq!(res[1].cover, "");
        assert_eq!(res[1].description, "");
    }

    #[test]
    fn tmdb_series_use_name_and_first_air_date() {
        let res = tmdb_series(parse(json!({
            "results": [{"name": "Dark", "overview": "Time", "first_air_date": "2017-12-01"}],
        })));
        assert_eq!(res[0].title, "Dark");
        assert_eq!(res[0].release_date, "2017-12-01");
    }

    #[test]
    fn books_read_volume_info() {
        let res = google_books(parse(json!({
            "items": [
                {"volumeInfo": {
                    "title": "Dune",
                    "authors": ["Frank Herbert"],
                    "publishedDate": "1965",
                    "imageLinks": {"thumbnail": "http://books/dune.jpg"},
                }},
                {"volumeInfo": {"title": "Bare"}},
            ],
        })));
        assert_eq!(res[0].author, vec![String::from("Frank Herbert")]);
        assert_eq!(res[0].cover, "http://books/dune.jpg");
        assert_eq!(res[1].cover, "");
        assert!(res[1].author.is_empty());
        assert!(google_books(parse(json!({"totalItems": 0}))).is_empty());
    }

    #[test]
    fn itunes_falls_back_on_placeholders() {
        let res = itunes(parse(json!({
            "resultCount": 2,
            "results": [
                {
                    "collectionName": "Discovery",
                    "collectionCensoredName": "Discovery",
                    "artworkUrl100": "https://a/100x100bb.jpg",
                    "artistName": "Daft Punk",
                    "releaseDate": "2001-03-07T08:00:00Z",
                },
                {"trackName": "Single"},
                {},
            ],
        })));
        assert_eq!(res[0].cover, "https://a/500x500bb.jpg");
        assert_eq!(res[0].author, vec![String::from("Daft Punk")]);
        assert_eq!(res[1].title, "Single");
        assert_eq!(res[1].author, vec![String::from("Unknown artist")]);
        assert_eq!(res[2].title, "Unknown");
    }

    #[test]
    fn rawg_lists_developers() {
        let res = rawg(parse(json!({
            "count": 1,
            "results": [{
                "name": "Hades",
                "background_image": "https://rawg/hades.jpg",
                "released": "2020-09-17",
                "developers": [{"name": "Supergiant Games"}],
            }],
        })));
        assert_eq!(res[0].title, "Hades");
        assert_eq!(res[0].author, vec![String::from("Supergiant Games")]);
        assert_eq!(res[0].description, "");
    }
}
