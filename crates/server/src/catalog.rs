//! Read-only catalog queries, answered from the in-memory index.

use data_loader::{DataIndex, Genre, Movie, Rating, UserId};

use crate::error::{RecommendError, Result};

/// Parse a user id as received from an outer layer (path segment, flag)
pub fn parse_user_id(raw: Option<&str>) -> Result<UserId> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(RecommendError::MissingUser);
    }
    raw.parse()
        .map_err(|_| RecommendError::InvalidUser(raw.to_string()))
}

/// Every rating the user has given, in load order. Unknown users have none.
pub fn ratings(index: &DataIndex, user_id: UserId) -> &[Rating] {
    index.get_user_ratings(user_id)
}

/// Movies whose genre set contains `genre`, ordered by movie id.
///
/// A genre no movie carries yields an empty list.
pub fn movies_by_genre<'a>(index: &'a DataIndex, genre: &str) -> Result<Vec<&'a Movie>> {
    let genre = genre.trim();
    if genre.is_empty() {
        return Err(RecommendError::MissingGenre);
    }

    Ok(index
        .get_movies_by_genre(&Genre::from(genre))
        .iter()
        .filter_map(|&id| index.get_movie(id))
        .collect())
}

/// The full catalog, ordered by movie id
pub fn all_movies(index: &DataIndex) -> Vec<&Movie> {
    index.all_movies()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> DataIndex {
        let mut index = DataIndex::new();
        index.insert_movie(Movie {
            id: 2,
            title: "Heat (1995)".into(),
            year: Some(1995),
            genres: vec![Genre::Action, Genre::Crime, Genre::Other("Heist".into())],
        });
        index.insert_movie(Movie {
            id: 1,
            title: "Toy Story (1995)".into(),
            year: Some(1995),
            genres: vec![Genre::Animation, Genre::Comedy],
        });
        index.insert_rating(Rating {
            user_id: 5,
            movie_id: 2,
            rating: 4.0,
            timestamp: 964982703,
        });
        index.build_secondary_indices();
        index
    }

    #[test]
    fn test_parse_user_id() {
        assert_eq!(parse_user_id(Some(" 12 ")).unwrap(), 12);
        assert!(matches!(parse_user_id(None), Err(RecommendError::MissingUser)));
        assert!(matches!(parse_user_id(Some("")), Err(RecommendError::MissingUser)));
        assert!(matches!(
            parse_user_id(Some("abc")),
            Err(RecommendError::InvalidUser(_))
        ));
    }

    #[test]
    fn test_ratings_for_known_and_unknown_user() {
        let index = index();
        assert_eq!(ratings(&index, 5).len(), 1);
        assert!(ratings(&index, 6).is_empty());
    }

    #[test]
    fn test_movies_by_genre() {
        let index = index();
        let action = movies_by_genre(&index, "action").unwrap();
        assert_eq!(action.iter().map(|m| m.id).collect::<Vec<_>>(), vec![2]);

        assert!(movies_by_genre(&index, "Western").unwrap().is_empty());
        assert!(movies_by_genre(&index, "Space Opera").unwrap().is_empty());

        let heist = movies_by_genre(&index, "Heist").unwrap();
        assert_eq!(heist.iter().map(|m| m.id).collect::<Vec<_>>(), vec![2]);

        let err = movies_by_genre(&index, " ").unwrap_err();
        assert!(matches!(err, RecommendError::MissingGenre));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_all_movies_sorted() {
        let index = index();
        let ids: Vec<_> = all_movies(&index).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
