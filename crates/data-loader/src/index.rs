//! DataIndex building and loading.
//!
//! Parses the rating and movie files in parallel, fills the rating matrix and
//! the catalog, builds the genre index and validates the rating scale.

use crate::error::{DataLoadError, Result};
use crate::parser;
use crate::types::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Accepted file names, in order of preference
const RATINGS_FILES: [&str; 2] = ["ratings.csv", "ratings.dat"];
const MOVIES_FILES: [&str; 2] = ["movies.csv", "movies.dat"];

fn resolve(data_dir: &Path, candidates: &[&str]) -> Result<PathBuf> {
    candidates
        .iter()
        .map(|name| data_dir.join(name))
        .find(|path| path.exists())
        .ok_or_else(|| DataLoadError::FileNotFound {
            path: data_dir.join(candidates[0]).display().to_string(),
        })
}

impl DataIndex {
    /// Load the rating matrix and movie catalog from a directory
    ///
    /// Looks for `ratings.csv` / `movies.csv`, falling back to the `.dat`
    /// layout of the 1M dataset.
    pub fn load_from_files(data_dir: &Path) -> Result<Self> {
        info!("Loading rating data from {:?}", data_dir);

        let ratings_path = resolve(data_dir, &RATINGS_FILES)?;
        let movies_path = resolve(data_dir, &MOVIES_FILES)?;

        // Both files parse independently
        let (ratings, movies) = rayon::join(
            || parser::parse_ratings(&ratings_path),
            || parser::parse_movies(&movies_path),
        );
        let ratings = ratings?;
        let movies = movies?;

        info!("Parsed {} ratings and {} movies", ratings.len(), movies.len());

        let mut index = DataIndex::new();
        for movie in movies {
            index.insert_movie(movie);
        }
        for rating in ratings {
            index.insert_rating(rating);
        }

        index.build_secondary_indices();
        index.validate()?;

        let (users, movies, ratings) = index.counts();
        info!(users, movies, ratings, "DataIndex built and validated");
        Ok(index)
    }

    /// Build the genre index after the catalog is loaded
    pub fn build_secondary_indices(&mut self) {
        self.genre_index.clear();
        for (movie_id, movie) in &self.movies {
            for genre in &movie.genres {
                self.genre_index
                    .entry(genre.clone())
                    .or_default()
                    .push(*movie_id);
            }
        }
        for ids in self.genre_index.values_mut() {
            ids.sort_unstable();
        }
    }

    /// Validate data integrity
    ///
    /// - at least one rating was loaded
    /// - every rating lies within [MIN_RATING, MAX_RATING]
    ///
    /// Ratings for movies missing from the catalog are only counted and
    /// logged; they still take part in similarity search.
    pub fn validate(&self) -> Result<()> {
        if self.matrix.is_empty() {
            return Err(DataLoadError::ValidationError(
                "no ratings were loaded".to_string(),
            ));
        }

        let mut unknown_movies = 0usize;
        for ratings in self.matrix.values() {
            for (movie_id, &rating) in ratings {
                if !(MIN_RATING..=MAX_RATING).contains(&rating) {
                    return Err(DataLoadError::InvalidValue {
                        field: "rating".to_string(),
                        value: rating.to_string(),
                    });
                }
                if !self.movies.contains_key(movie_id) {
                    unknown_movies += 1;
                }
            }
        }

        if unknown_movies > 0 {
            warn!(unknown_movies, "Ratings reference movies missing from the catalog");
        }
        Ok(())
    }
}
