//! Fallback genre table in case the live genre-list fetch fails, matching
//! the catalog's movie genre ids.
use crate::tmdb::Genre;

pub fn fallback_genres() -> Vec<Genre> {
    [
        (28, "Action"),
        (12, "Adventure"),
        (16, "Animation"),
        (35, "Comedy"),
        (80, "Crime"),
        (99, "Documentary"),
        (18, "Drama"),
        (10751, "Family"),
        (14, "Fantasy"),
        (36, "History"),
        (27, "Horror"),
        (10402, "Music"),
        (9648, "Mystery"),
        (10749, "Romance"),
        (878, "Science Fiction"),
        (10770, "TV Movie"),
        (53, "Thriller"),
        (10752, "War"),
        (37, "Western"),
    ]
    .into_iter()
    .map(|(id, name)| Genre {
        id,
        name: name.to_string(),
    })
    .collect()
}
