use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Row};

use crate::dogs::domain::{DogId, DogRecord, DogUpdate, NewDog};
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

/// Dog record operations, independent of where the records live.
#[async_trait]
pub trait DogRepository: Send + Sync {
    /// All records in insertion order.
    async fn list(&self) -> AppResult<Vec<DogRecord>>;

    /// Persist a new record. `adopted` starts false; `date_added` defaults to now.
    async fn create(&self, dog: NewDog) -> AppResult<DogRecord>;

    async fn get(&self, id: &DogId) -> AppResult<DogRecord>;

    /// Apply a partial update and return the stored result.
    async fn update(&self, id: &DogId, update: DogUpdate) -> AppResult<DogRecord>;

    /// Remove a record. Missing ids yield `NotFound`.
    async fn delete(&self, id: &DogId) -> AppResult<()>;
}

pub struct SqliteDogRepository {
    pool: DbPool,
    placeholder_image: String,
}

impl SqliteDogRepository {
    pub fn new(pool: DbPool, placeholder_image: impl Into<String>) -> Self {
        Self {
            pool,
            placeholder_image: placeholder_image.into(),
        }
    }
}

const DOG_COLUMNS: &str =
    "id, name, age_yr, age_mo, breed, location, image, description, adopted, date_added";

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_error(
    column: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

fn dog_from_row(row: &Row<'_>) -> rusqlite::Result<DogRecord> {
    let id: String = row.get(0)?;
    let date_added: String = row.get(9)?;

    let id = uuid::Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?;
    let date_added = DateTime::parse_from_rfc3339(&date_added)
        .map_err(|e| conversion_error(9, e))?
        .with_timezone(&Utc);

    Ok(DogRecord {
        id: DogId::from(id),
        name: row.get(1)?,
        age_yr: row.get(2)?,
        age_mo: row.get(3)?,
        breed: row.get(4)?,
        location: row.get(5)?,
        image: row.get(6)?,
        description: row.get(7)?,
        adopted: row.get(8)?,
        date_added,
    })
}

#[async_trait]
impl DogRepository for SqliteDogRepository {
    async fn list(&self) -> AppResult<Vec<DogRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM dogs ORDER BY seq", DOG_COLUMNS))?;
        let dogs = stmt
            .query_map([], dog_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(dogs)
    }

    async fn create(&self, dog: NewDog) -> AppResult<DogRecord> {
        let record = DogRecord {
            id: DogId::generate(),
            name: dog.name,
            age_yr: dog.age_yr,
            age_mo: dog.age_mo,
            breed: dog.breed,
            location: dog.location,
            image: dog
                .image
                .unwrap_or_else(|| self.placeholder_image.clone()),
            description: dog.description,
            adopted: false,
            // Matches the precision stored in the table.
            date_added: dog.date_added.unwrap_or_else(Utc::now).trunc_subsecs(3),
        };

        let conn = self.pool.get()?;
        conn.execute(
            &format!(
                "INSERT INTO dogs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                DOG_COLUMNS
            ),
            params![
                record.id.to_string(),
                record.name,
                record.age_yr,
                record.age_mo,
                record.breed,
                record.location,
                record.image,
                record.description,
                record.adopted,
                format_ts(&record.date_added),
            ],
        )?;

        tracing::info!(dog_id = %record.id, name = %record.name, "Dog created");
        Ok(record)
    }

    async fn get(&self, id: &DogId) -> AppResult<DogRecord> {
        let conn = self.pool.get()?;
        let result = conn.query_row(
            &format!("SELECT {} FROM dogs WHERE id = ?1", DOG_COLUMNS),
            params![id.to_string()],
            dog_from_row,
        );

        match result {
            Ok(dog) => Ok(dog),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(AppError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, id: &DogId, update: DogUpdate) -> AppResult<DogRecord> {
        let mut dog = self.get(id).await?;
        if update.is_empty() {
            return Ok(dog);
        }
        update.apply(&mut dog, &self.placeholder_image);

        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE dogs SET name = ?2, age_yr = ?3, age_mo = ?4, breed = ?5, location = ?6,
                image = ?7, description = ?8, adopted = ?9
             WHERE id = ?1",
            params![
                id.to_string(),
                dog.name,
                dog.age_yr,
                dog.age_mo,
                dog.breed,
                dog.location,
                dog.image,
                dog.description,
                dog.adopted,
            ],
        )?;

        // Deleted between the read and the write.
        if rows == 0 {
            return Err(AppError::NotFound);
        }

        tracing::info!(dog_id = %id, "Dog updated");
        Ok(dog)
    }

    async fn delete(&self, id: &DogId) -> AppResult<()> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM dogs WHERE id = ?1", params![id.to_string()])?;

        if rows == 0 {
            return Err(AppError::NotFound);
        }

        tracing::info!(dog_id = %id, "Dog deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    const PLACEHOLDER: &str = "https://example.org/placeholder.png";

    fn repo() -> SqliteDogRepository {
        SqliteDogRepository::new(test_pool(), PLACEHOLDER)
    }

    fn chester() -> NewDog {
        NewDog {
            age_yr: Some(7),
            ..NewDog::new("Chester", "beagle", "forever home")
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_fields() {
        let repo = repo();
        let before = Utc::now();
        let created = repo.create(chester()).await.unwrap();

        let fetched = repo.get(&created.id).await.unwrap();
        assert_eq!(fetched.name, "Chester");
        assert_eq!(fetched.age_yr, Some(7));
        assert_eq!(fetched.age_mo, None);
        assert_eq!(fetched.breed, "beagle");
        assert_eq!(fetched.location, "forever home");
        assert_eq!(fetched.image, PLACEHOLDER);
        assert!(!fetched.adopted);
        assert!(fetched.date_added >= before.trunc_subsecs(3));
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn list_preserves_insertion_order() {
        let repo = repo();
        for name in ["Ada", "Zed", "Mo"] {
            repo.create(NewDog::new(name, "mutt", "shelter")).await.unwrap();
        }
        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["Ada", "Zed", "Mo"]);
    }

    #[tokio::test]
    async fn list_on_empty_store_is_empty() {
        assert!(repo().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let result = repo().get(&DogId::generate()).await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let repo = repo();
        let mut dog = chester();
        dog.description = Some("Loves naps".into());
        let created = repo.create(dog).await.unwrap();

        let updated = repo
            .update(
                &created.id,
                DogUpdate {
                    location: Some("foster".into()),
                    adopted: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.location, "foster");
        assert!(updated.adopted);

        let fetched = repo.get(&created.id).await.unwrap();
        assert_eq!(fetched.location, "foster");
        assert!(fetched.adopted);
        assert_eq!(fetched.name, created.name);
        assert_eq!(fetched.age_yr, created.age_yr);
        assert_eq!(fetched.breed, created.breed);
        assert_eq!(fetched.image, created.image);
        assert_eq!(fetched.description.as_deref(), Some("Loves naps"));
        assert_eq!(fetched.date_added, created.date_added);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let result = repo()
            .update(
                &DogId::generate(),
                DogUpdate {
                    name: Some("Ghost".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let repo = repo();
        let created = repo.create(chester()).await.unwrap();
        repo.delete(&created.id).await.unwrap();

        assert!(matches!(repo.get(&created.id).await, Err(AppError::NotFound)));
        assert!(matches!(repo.delete(&created.id).await, Err(AppError::NotFound)));
    }
}
