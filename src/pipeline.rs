use chrono::{Datelike, NaiveDate, NaiveTime};
use icu_collator::{Collator, CollatorOptions, Strength};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::tmdb::MovieSummary;

/// Below this many strict matches, an over-constrained filter result is
/// widened so the grid never sits emptier than necessary.
pub const MIN_GRID_FILL: usize = 12;

const RELEASE_DATE_FORMAT: &str = "%Y-%m-%d";

// Root-locale collation at secondary strength: accent-aware, case-insensitive.
// `Collator` is not `Sync`, so it is stored per-thread rather than in a shared
// static; collation is deterministic, so the comparison result is unchanged.
thread_local! {
    static TITLE_COLLATOR: Collator = {
        let mut options = CollatorOptions::new();
        options.strength = Some(Strength::Secondary);
        Collator::try_new(&Default::default(), options).expect("collation data is compiled in")
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    PopularityDesc,
    RatingDesc,
    ReleaseDateDesc,
    ReleaseDateAsc,
    TitleAsc,
    TitleDesc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(default)]
    pub genres: Vec<i32>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub min_rating: Option<f64>,
    #[serde(default)]
    pub sort_by: SortKey,
}

/// Working set for the active category: deduplicated, poster-filtered and
/// shuffled. Only `build_pool` constructs a non-empty one, so every element
/// carries a unique id and a displayable poster.
#[derive(Debug, Clone, Default)]
pub struct ResultPool {
    movies: Vec<MovieSummary>,
}

impl ResultPool {
    pub fn movies(&self) -> &[MovieSummary] {
        &self.movies
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }
}

/// Merge page batches into one pool: concatenate in arrival order, drop
/// records without a poster, dedupe by id keeping the first occurrence,
/// then shuffle so no single source category dominates the unfiltered view.
pub fn build_pool(batches: Vec<Vec<MovieSummary>>) -> ResultPool {
    let mut seen = HashSet::new();
    let mut movies: Vec<MovieSummary> = batches
        .into_iter()
        .flatten()
        .filter(|m| m.poster_path.as_deref().is_some_and(|p| !p.is_empty()))
        .filter(|m| seen.insert(m.id))
        .collect();
    movies.shuffle(&mut rand::rng());
    ResultPool { movies }
}

/// Filter and sort the pool against the criteria. Pure: the pool is not
/// mutated and no I/O happens. When the strict result underfills the grid
/// and the pool itself is large enough, fall back to a genre-only pass and
/// keep whichever result is larger.
pub fn apply_filters(pool: &ResultPool, criteria: &FilterCriteria) -> Vec<MovieSummary> {
    let strict = select(&pool.movies, criteria, true);
    if strict.len() >= MIN_GRID_FILL || pool.movies.len() < MIN_GRID_FILL {
        return strict;
    }

    let relaxed = select(&pool.movies, criteria, false);
    if relaxed.len() > strict.len() {
        relaxed
    } else {
        strict
    }
}

// The relaxed pass keeps only the genre constraint; year and rating are the
// ones that tend to over-narrow the grid.
fn select(movies: &[MovieSummary], criteria: &FilterCriteria, strict: bool) -> Vec<MovieSummary> {
    let mut picked: Vec<MovieSummary> = movies
        .iter()
        .filter(|m| matches_genres(m, &criteria.genres))
        .filter(|m| !strict || matches_year(m, criteria.year))
        .filter(|m| !strict || matches_rating(m, criteria.min_rating))
        .cloned()
        .collect();
    sort_movies(&mut picked, criteria.sort_by);
    picked
}

fn matches_genres(movie: &MovieSummary, wanted: &[i32]) -> bool {
    wanted.is_empty() || movie.genre_ids.iter().any(|g| wanted.contains(g))
}

// Exact-year match on the parsed release date; dateless records never match.
fn matches_year(movie: &MovieSummary, year: Option<i32>) -> bool {
    match year {
        None => true,
        Some(wanted) => release_date(movie).is_some_and(|d| d.year() == wanted),
    }
}

fn matches_rating(movie: &MovieSummary, min_rating: Option<f64>) -> bool {
    min_rating.is_none_or(|min| movie.vote_average >= min)
}

pub fn sort_movies(movies: &mut [MovieSummary], key: SortKey) {
    match key {
        SortKey::PopularityDesc => {
            movies.sort_by(|a, b| b.popularity.total_cmp(&a.popularity));
        }
        SortKey::RatingDesc => {
            movies.sort_by(|a, b| b.vote_average.total_cmp(&a.vote_average));
        }
        SortKey::ReleaseDateDesc => {
            movies.sort_by(|a, b| release_timestamp(b).cmp(&release_timestamp(a)));
        }
        SortKey::ReleaseDateAsc => {
            movies.sort_by(|a, b| release_timestamp(a).cmp(&release_timestamp(b)));
        }
        SortKey::TitleAsc => {
            movies.sort_by(|a, b| compare_titles(&a.title, &b.title));
        }
        SortKey::TitleDesc => {
            movies.sort_by(|a, b| compare_titles(&b.title, &a.title));
        }
    }
}

pub fn compare_titles(a: &str, b: &str) -> Ordering {
    TITLE_COLLATOR.with(|collator| collator.compare(a, b))
}

fn release_date(movie: &MovieSummary) -> Option<NaiveDate> {
    movie
        .release_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, RELEASE_DATE_FORMAT).ok())
}

// Missing or unparseable dates sort as timestamp zero, i.e. oldest.
fn release_timestamp(movie: &MovieSummary) -> i64 {
    release_date(movie)
        .map(|d| d.and_time(NaiveTime::MIN).and_utc().timestamp())
        .unwrap_or(0)
}
