use bytes::Bytes;
use serde::Deserialize;

use crate::db::{DBService, Image, NewImage, Project, ProjectWithImages};
use crate::error::{AppError, Result};
use crate::storage::ObjectStore;

/// One file from the multipart request, fully buffered.
#[derive(Debug)]
pub struct FileUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug)]
pub struct CreateProject {
    pub title: String,
    pub description: String,
    pub files: Vec<FileUpload>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateProject {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Per-file result of the sequential storage pass. The first failure aborts
/// the rest of the loop, which then shows up as `Skipped`.
#[derive(Debug, PartialEq, Eq)]
enum StoreOutcome {
    Stored(String),
    Failed(String),
    Skipped(String),
}

pub async fn list_projects(
    db: &DBService,
    include_images: bool,
) -> Result<Vec<ProjectWithImages>> {
    if include_images {
        db.list_projects_with_images().await
    } else {
        Ok(db
            .list_projects()
            .await?
            .into_iter()
            .map(|project| ProjectWithImages {
                project,
                images: None,
            })
            .collect())
    }
}

pub async fn get_project(db: &DBService, id: i64) -> Result<Project> {
    db.get_project(id)
        .await?
        .ok_or(AppError::NotFound { what: "Project" })
}

/// Create a project and its image rows, then upload the file contents.
///
/// The database write comes first: if it fails, no storage call is made at
/// all. Uploads then run strictly one after the other, and the first failure
/// aborts the remaining ones. The rows are deliberately *not* rolled back in
/// that case; the call still reports the created project and the gap is only
/// logged. Best effort between the two backends, no two-phase commit.
pub async fn create_project<S: ObjectStore>(
    db: &DBService,
    store: &S,
    req: CreateProject,
) -> Result<ProjectWithImages> {
    let new_images: Vec<NewImage> = req
        .files
        .iter()
        .map(|f| {
            let key = object_key(&f.filename);
            NewImage {
                path: store.public_url(&key),
                filename: key,
            }
        })
        .collect();

    let created = db
        .create_project(&req.title, &req.description, &new_images)
        .await?;

    let outcomes = store_files(store, req.files).await;
    let stored = outcomes
        .iter()
        .filter(|o| matches!(o, StoreOutcome::Stored(_)))
        .count();
    if stored < outcomes.len() {
        tracing::warn!(
            "project {} created with {}/{} objects stored: {:?}",
            created.project.id,
            stored,
            outcomes.len(),
            outcomes
        );
    }

    Ok(created)
}

pub async fn update_project(
    db: &DBService,
    id: i64,
    update: UpdateProject,
) -> Result<Project> {
    db.update_project(id, update.title.as_deref(), update.description.as_deref())
        .await?
        .ok_or(AppError::NotFound { what: "Project" })
}

/// Delete a project, its image rows and its stored objects.
///
/// Object deletions run first, sequentially, and the first failure aborts the
/// remaining ones without failing the request. The rows go away regardless,
/// in one transaction, so an image row never outlives its project.
pub async fn delete_project<S: ObjectStore>(db: &DBService, store: &S, id: i64) -> Result<()> {
    if db.get_project(id).await?.is_none() {
        return Err(AppError::NotFound { what: "Project" });
    }

    let images = db.list_images(id).await?;
    for image in &images {
        if let Err(err) = store.delete_object(&image.filename).await {
            tracing::error!(
                "stopping object deletion for project {id} at {}: {err:?}",
                image.filename
            );
            break;
        }
    }

    db.delete_project(id).await?;
    tracing::info!("deleted project {id} and {} images", images.len());
    Ok(())
}

pub async fn list_images_by_project(db: &DBService, project_id: i64) -> Result<Vec<Image>> {
    db.list_images(project_id).await
}

/// Delete a single image. A storage failure is logged and does not stop the
/// row deletion, unlike the project-wide loop.
pub async fn delete_image<S: ObjectStore>(db: &DBService, store: &S, id: i64) -> Result<()> {
    let image = db
        .get_image(id)
        .await?
        .ok_or(AppError::NotFound { what: "Image" })?;

    if let Err(err) = store.delete_object(&image.filename).await {
        tracing::error!("cannot delete object {} for image {id}: {err:?}", image.filename);
    }

    db.delete_image(id).await?;
    Ok(())
}

async fn store_files<S: ObjectStore>(store: &S, files: Vec<FileUpload>) -> Vec<StoreOutcome> {
    let mut outcomes = Vec::with_capacity(files.len());
    let mut aborted = false;
    for file in files {
        let key = object_key(&file.filename);
        if aborted {
            outcomes.push(StoreOutcome::Skipped(key));
            continue;
        }
        match store
            .put_object(&key, file.content_type.as_deref(), file.bytes)
            .await
        {
            Ok(()) => outcomes.push(StoreOutcome::Stored(key)),
            Err(err) => {
                tracing::error!("upload of {key} failed, aborting the rest: {err:?}");
                aborted = true;
                outcomes.push(StoreOutcome::Failed(key));
            }
        }
    }
    outcomes
}

/// Object key for a client-supplied filename: path components stripped,
/// then url-encoded. Collisions between identical filenames are accepted.
pub(crate) fn object_key(filename: &str) -> String {
    let name = filename.rsplit('/').next().unwrap_or(filename);
    urlencoding::encode(name).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{broken_db, memory_db};
    use crate::error::AppError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, PartialEq, Eq)]
    enum Call {
        Put(String),
        Delete(String),
    }

    /// Records every call, fails any whose key is in `fail_on`.
    #[derive(Debug, Default)]
    struct FakeStore {
        calls: Mutex<Vec<Call>>,
        fail_on: Vec<String>,
    }

    impl FakeStore {
        fn failing_on(keys: &[&str]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: keys.iter().map(|k| k.to_string()).collect(),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().drain(..).collect()
        }

        fn maybe_fail(&self, key: &str) -> Result<()> {
            if self.fail_on.iter().any(|k| k == key) {
                Err(AppError::StoreError {
                    message: format!("injected failure for {key}"),
                    source: "fake".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        fn public_url(&self, key: &str) -> String {
            format!("https://bucket.s3.amazonaws.com/{key}")
        }

        async fn put_object(
            &self,
            key: &str,
            _content_type: Option<&str>,
            _bytes: Bytes,
        ) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Put(key.to_string()));
            self.maybe_fail(key)
        }

        async fn delete_object(&self, key: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Delete(key.to_string()));
            self.maybe_fail(key)
        }
    }

    fn upload(name: &str) -> FileUpload {
        FileUpload {
            filename: name.to_string(),
            content_type: Some("image/jpeg".to_string()),
            bytes: Bytes::from_static(b"jpegbytes"),
        }
    }

    fn req(files: Vec<FileUpload>) -> CreateProject {
        CreateProject {
            title: "Trip".to_string(),
            description: "Summer".to_string(),
            files,
        }
    }

    #[tokio::test]
    async fn create_stores_rows_and_objects() {
        let db = memory_db().await;
        let store = FakeStore::default();

        let created = create_project(&db, &store, req(vec![upload("a.jpg"), upload("b c.jpg")]))
            .await
            .unwrap();

        assert_eq!(created.project.title, "Trip");
        let images = created.images.unwrap();
        assert_eq!(images.len(), 2);
        assert!(images[0].path.ends_with("a.jpg"));
        // key is url-encoded both in the row and in the store
        assert_eq!(images[1].filename, "b%20c.jpg");
        assert_eq!(
            store.calls(),
            vec![
                Call::Put("a.jpg".to_string()),
                Call::Put("b%20c.jpg".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn create_with_failed_persistence_makes_no_storage_call() {
        let db = broken_db().await;
        let store = FakeStore::default();

        let err = create_project(&db, &store, req(vec![upload("a.jpg")]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CreateFailed { .. }));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn create_aborts_uploads_after_first_failure_but_keeps_rows() {
        let db = memory_db().await;
        let store = FakeStore::failing_on(&["b.jpg"]);

        let created = create_project(
            &db,
            &store,
            req(vec![upload("a.jpg"), upload("b.jpg"), upload("c.jpg")]),
        )
        .await
        .unwrap();

        // c.jpg never attempted
        assert_eq!(
            store.calls(),
            vec![
                Call::Put("a.jpg".to_string()),
                Call::Put("b.jpg".to_string())
            ]
        );
        // yet all three rows exist
        let rows = db.list_images(created.project.id).await.unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn delete_removes_rows_and_objects() {
        let db = memory_db().await;
        let store = FakeStore::default();
        let created = create_project(&db, &store, req(vec![upload("a.jpg"), upload("b.jpg")]))
            .await
            .unwrap();
        let id = created.project.id;
        store.calls();

        delete_project(&db, &store, id).await.unwrap();

        assert_eq!(
            store.calls(),
            vec![
                Call::Delete("a.jpg".to_string()),
                Call::Delete("b.jpg".to_string())
            ]
        );
        assert!(db.get_project(id).await.unwrap().is_none());
        assert!(db.list_images(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_aborts_object_loop_on_failure_but_rows_still_go() {
        let db = memory_db().await;
        let store = FakeStore::failing_on(&["a.jpg"]);
        let created = create_project(&db, &store, req(vec![upload("a.jpg"), upload("b.jpg")]))
            .await
            .unwrap();
        let id = created.project.id;
        store.calls();

        delete_project(&db, &store, id).await.unwrap();

        // b.jpg deletion never attempted after a.jpg failed
        assert_eq!(store.calls(), vec![Call::Delete("a.jpg".to_string())]);
        assert!(db.get_project(id).await.unwrap().is_none());
        assert!(db.list_images(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_project_touches_nothing() {
        let db = memory_db().await;
        let store = FakeStore::default();

        let err = delete_project(&db, &store, 42).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { what: "Project" }));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_image_survives_a_storage_failure() {
        let db = memory_db().await;
        let store = FakeStore::failing_on(&["a.jpg"]);
        let created = create_project(&db, &store, req(vec![upload("a.jpg")]))
            .await
            .unwrap();
        let image_id = created.images.unwrap()[0].id;

        // log-and-continue: the row goes away even though the object didn't
        delete_image(&db, &store, image_id).await.unwrap();
        assert!(db.get_image(image_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_missing_image_is_not_found() {
        let db = memory_db().await;
        let store = FakeStore::default();

        let err = delete_image(&db, &store, 42).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { what: "Image" }));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn list_without_flag_omits_images() {
        let db = memory_db().await;
        let store = FakeStore::default();
        create_project(&db, &store, req(vec![upload("a.jpg")]))
            .await
            .unwrap();

        let bare = list_projects(&db, false).await.unwrap();
        assert!(bare[0].images.is_none());

        let nested = list_projects(&db, true).await.unwrap();
        assert_eq!(nested[0].images.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn object_key_strips_directories_and_encodes() {
        assert_eq!(object_key("a.jpg"), "a.jpg");
        assert_eq!(object_key("holiday/b c.jpg"), "b%20c.jpg");
        assert_eq!(object_key("/tmp/x.png"), "x.png");
    }
}
