//! # Data Loader Crate
//!
//! Loads the MovieLens ratings and movie catalog into an immutable,
//! shareable [`DataIndex`].
//!
//! ## Main Components
//!
//! - **types**: Core domain types (RatingMatrix, Movie, Rating, Genre, DataIndex)
//! - **parser**: Parse the CSV / DAT files into Rust structs
//! - **index**: Build the index and validate it
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::DataIndex;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let index = Arc::new(DataIndex::load_from_files(Path::new("data/clean"))?);
//! let vector = index.user_vector(1).unwrap();
//! println!("User 1 rated {} movies", vector.len());
//! ```

pub mod error;
pub mod index;
pub mod parser;
pub mod types;

pub use error::{DataLoadError, Result};
pub use types::{
    // Type aliases
    MovieId,
    RatingMatrix,
    UserId,
    UserRatings,
    // Core types
    DataIndex,
    Genre,
    Movie,
    Rating,
    // Rating scale
    MAX_RATING,
    MIN_RATING,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_data_index_creation() {
        let index = DataIndex::new();
        let (users, movies, ratings) = index.counts();

        assert_eq!(users, 0);
        assert_eq!(movies, 0);
        assert_eq!(ratings, 0);
    }

    #[test]
    fn test_insert_movie() {
        let mut index = DataIndex::new();

        index.insert_movie(Movie {
            id: 1,
            title: "Toy Story (1995)".to_string(),
            year: Some(1995),
            genres: vec![Genre::Animation, Genre::Children, Genre::Comedy],
        });
        index.build_secondary_indices();

        let retrieved = index.get_movie(1).unwrap();
        assert_eq!(retrieved.year, Some(1995));
        assert_eq!(index.get_movies_by_genre(&Genre::Children), &[1]);
        assert_eq!(index.all_movies().len(), 1);
    }

    #[test]
    fn test_insert_rating_updates_matrix_and_history() {
        let mut index = DataIndex::new();

        index.insert_rating(Rating {
            user_id: 1,
            movie_id: 1193,
            rating: 5.0,
            timestamp: 978300760,
        });

        assert!(index.contains_user(1));
        assert_eq!(index.user_vector(1).unwrap()[&1193], 5.0);
        assert_eq!(index.get_user_ratings(1).len(), 1);
    }

    #[test]
    fn test_empty_queries() {
        let index = DataIndex::new();

        assert!(index.user_vector(999).is_none());
        assert!(index.get_movie(999).is_none());
        assert!(index.get_user_ratings(999).is_empty());
        assert!(index.get_movies_by_genre(&Genre::Action).is_empty());
    }

    #[test]
    fn test_from_matrix() {
        let matrix: RatingMatrix = HashMap::from([
            (1, HashMap::from([(1, 5.0), (2, 3.0)])),
            (2, HashMap::from([(1, 4.0)])),
        ]);
        let index = DataIndex::from(matrix);
        assert_eq!(index.counts(), (2, 0, 3));
    }

    #[test]
    fn test_genre_labels_round_trip_through_from_str() {
        for genre in Genre::ALL {
            assert_eq!(genre.label().parse::<Genre>().unwrap(), genre);
        }
        assert_eq!("sci-fi".parse::<Genre>().unwrap(), Genre::SciFi);
        assert_eq!(
            serde_json::to_string(&Genre::FilmNoir).unwrap(),
            "\"Film-Noir\""
        );
    }

    #[test]
    fn test_unlisted_genre_is_kept() {
        let genre: Genre = "Biography".parse().unwrap();
        assert_eq!(genre, Genre::Other("Biography".into()));
        assert_eq!(genre.to_string(), "Biography");
        assert_eq!(serde_json::to_string(&genre).unwrap(), "\"Biography\"");
        assert_eq!(
            serde_json::from_str::<Genre>("\"sci-fi\"").unwrap(),
            Genre::SciFi
        );
        assert!("  ".parse::<Genre>().is_err());
    }
}
