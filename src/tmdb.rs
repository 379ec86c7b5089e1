use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;

const TMDB_BASE: &str = "https://api.themoviedb.org/3";

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
}

#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn popular(&self, page: u32) -> Result<MoviePage>;
    async fn top_rated(&self, page: u32) -> Result<MoviePage>;
    async fn upcoming(&self, page: u32) -> Result<MoviePage>;
    async fn search(&self, query: &str, page: u32) -> Result<MoviePage>;
    async fn movie_details(&self, id: i64) -> Result<MovieDetails>;
    async fn genre_list(&self) -> Result<Vec<Genre>>;
}

/// One of the catalog listing types, or a free-text search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "kebab-case")]
pub enum Category {
    Popular,
    TopRated,
    Upcoming,
    Search { query: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieSummary {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: u32,
    #[serde(default)]
    pub genre_ids: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoviePage {
    pub page: u32,
    pub results: Vec<MovieSummary>,
    pub total_pages: u32,
    pub total_results: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genre {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieDetails {
    pub id: i64,
    pub title: String,
    pub tagline: Option<String>,
    #[serde(default)]
    pub overview: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub runtime: Option<u32>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: u32,
    #[serde(default)]
    pub popularity: f64,
    pub homepage: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub budget: u64,
    #[serde(default)]
    pub revenue: u64,
    #[serde(default)]
    pub production_companies: Vec<ProductionCompany>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionCompany {
    pub id: i64,
    pub name: String,
    pub logo_path: Option<String>,
}

impl TmdbClient {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("TMDB_API_KEY").context("TMDB_API_KEY not set")?;
        Ok(Self {
            client: Client::new(),
            api_key,
        })
    }

    async fn fetch_listing(&self, listing: &str, page: u32) -> Result<MoviePage> {
        let url = format!(
            "{TMDB_BASE}/movie/{listing}?language=en-US&page={page}&api_key={}",
            self.api_key
        );
        self.get_json(&url).await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .context("request failed")?;
        let status = res.status();
        let text = res.text().await.context("reading body failed")?;
        if !status.is_success() {
            return Err(anyhow!("{} -> {}", url, text));
        }
        let parsed: T = serde_json::from_str(&text).context("JSON parse failed")?;
        Ok(parsed)
    }
}

#[async_trait]
impl CatalogApi for TmdbClient {
    async fn popular(&self, page: u32) -> Result<MoviePage> {
        self.fetch_listing("popular", page).await
    }

    async fn top_rated(&self, page: u32) -> Result<MoviePage> {
        self.fetch_listing("top_rated", page).await
    }

    async fn upcoming(&self, page: u32) -> Result<MoviePage> {
        self.fetch_listing("upcoming", page).await
    }

    async fn search(&self, query: &str, page: u32) -> Result<MoviePage> {
        let url = format!(
            "{TMDB_BASE}/search/movie?api_key={}&query={}&page={page}&language=en-US",
            self.api_key,
            urlencoding::encode(query)
        );
        self.get_json(&url).await
    }

    async fn movie_details(&self, id: i64) -> Result<MovieDetails> {
        let url = format!(
            "{TMDB_BASE}/movie/{id}?language=en-US&api_key={}",
            self.api_key
        );
        self.get_json(&url).await
    }

    async fn genre_list(&self) -> Result<Vec<Genre>> {
        #[derive(Deserialize)]
        struct GenreListResponse {
            genres: Vec<Genre>,
        }

        let url = format!(
            "{TMDB_BASE}/genre/movie/list?language=en-US&api_key={}",
            self.api_key
        );
        let data: GenreListResponse = self.get_json(&url).await?;
        if data.genres.is_empty() {
            return Err(anyhow!("TMDB returned an empty genre list"));
        }
        Ok(data.genres)
    }
}
