use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::import::error::{ErrorKind, Result as ImportResult};
use exn::ResultExt;
use libra_api::Remote;
use libra_api::models::{CreateEbook, Ebook};
use libra_document::Format;
use libra_store::models::CachedEbook;
use libra_store::{Repository, timestamp};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

/// How many server ebooks are checked for a matching checksum.
pub const REMOTE_DUPLICATE_SCAN: u32 = 200;

const HASH_BUFFER: usize = 64 * 1024;

/// What the user filled in on the add-book form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportRequest {
    pub source: PathBuf,
    pub title: String,
    pub description: Option<String>,
    pub language_code: Option<String>,
    /// Inferred from the source extension when `None` or blank.
    pub format: Option<String>,
}
impl ImportRequest {
    fn format(&self) -> ImportResult<Format> {
        let parsed = match self.format.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            Some(format) => format.parse::<Format>(),
            None => Format::from_path(&self.source),
        };
        parsed.or_raise(|| ErrorKind::Validation("unsupported document format".to_string()))
    }
}

/// Why an import stopped to ask for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duplicate {
    pub checksum: String,
    /// A copy with the same content already sits in the books directory.
    pub local_path: Option<PathBuf>,
    /// The server already knows an ebook with the same checksum.
    pub remote: Option<Box<Ebook>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Nothing was copied or created; call again with `force` to import anyway.
    Duplicate(Duplicate),
    Imported(Box<CachedEbook>),
}

/// Import a book, or report a duplicate unless `force` is set.
///
/// A forced duplicate gets its own file (`<sha256>-<nanos><ext>`) so the
/// existing copy is left untouched.
#[instrument(skip_all, fields(source = %request.source.display(), force))]
pub async fn import_book(
    remote: &dyn Remote,
    repo: &Repository,
    books_dir: &Path,
    request: &ImportRequest,
    force: bool,
) -> LibraryResult<ImportOutcome> {
    let outcome = import_book_inner(remote, repo, books_dir, request, force).await;
    outcome.map_err(|err| {
        let kind = match &*err {
            ErrorKind::Validation(message) => LibraryErrorKind::Validation(message.clone()),
            ErrorKind::Remote(message) => LibraryErrorKind::Remote(message.clone()),
            _ => LibraryErrorKind::Import,
        };
        err.raise(kind)
    })
}

async fn import_book_inner(
    remote: &dyn Remote,
    repo: &Repository,
    books_dir: &Path,
    request: &ImportRequest,
    force: bool,
) -> ImportResult<ImportOutcome> {
    let title = request.title.trim();
    if title.is_empty() {
        exn::bail!(ErrorKind::Validation("title is required".to_string()));
    }
    let format = request.format()?;
    let metadata = match fs::metadata(&request.source).await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => exn::bail!(ErrorKind::Validation(format!("file not found: {}", request.source.display()))),
    };
    let file_size_bytes = i64::try_from(metadata.len()).or_raise(|| ErrorKind::Io)?;
    let checksum = sha256_file(request.source.clone()).await?;

    let ext = format.extension();
    let canonical = books_dir.join(format!("{checksum}{ext}"));
    let local_path = fs::try_exists(&canonical)
        .await
        .or_raise(|| ErrorKind::Io)?
        .then(|| canonical.clone());
    let remote_match = find_remote_duplicate(remote, &checksum).await?;
    let is_duplicate = local_path.is_some() || remote_match.is_some();
    if is_duplicate && !force {
        tracing::info!(%checksum, "duplicate book; waiting for confirmation");
        return Ok(ImportOutcome::Duplicate(Duplicate {
            checksum,
            local_path,
            remote: remote_match.map(Box::new),
        }));
    }

    let destination = if is_duplicate {
        let nanos = timestamp::now().unix_timestamp_nanos();
        books_dir.join(format!("{checksum}-{nanos}{ext}"))
    } else {
        canonical
    };
    fs::create_dir_all(books_dir).await.or_raise(|| ErrorKind::Io)?;
    fs::copy(&request.source, &destination).await.or_raise(|| ErrorKind::Io)?;

    let storage_key = destination.to_string_lossy().into_owned();
    let create = CreateEbook {
        title: title.to_string(),
        description: non_blank(request.description.as_deref()),
        format: format.to_string(),
        language_code: non_blank(request.language_code.as_deref()),
        storage_key: storage_key.clone(),
        file_size_bytes,
        checksum_sha256: checksum.clone(),
        imported_at: Some(timestamp::format(timestamp::now())),
    };
    let ebook = match remote.create_ebook(&create).await {
        Ok(ebook) => ebook,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&destination).await {
                tracing::warn!(path = %destination.display(), error = %cleanup, "could not remove copied book");
            }
            let message = (*e).to_string();
            return Err(e).or_raise(|| ErrorKind::Remote(message));
        },
    };

    let cached = CachedEbook::try_from(&ebook).or_raise(|| ErrorKind::Cache)?.with_file_path(storage_key);
    repo.upsert_ebook(&cached).await.or_raise(|| ErrorKind::Cache)?;
    tracing::info!(ebook_id = %cached.id, path = %destination.display(), "book imported");
    Ok(ImportOutcome::Imported(Box::new(cached)))
}

async fn find_remote_duplicate(remote: &dyn Remote, checksum: &str) -> ImportResult<Option<Ebook>> {
    match remote.list_ebooks(REMOTE_DUPLICATE_SCAN).await {
        Ok(page) => Ok(page.items.into_iter().find(|ebook| ebook.checksum_sha256.eq_ignore_ascii_case(checksum))),
        Err(e) => {
            let message = (*e).to_string();
            Err(e).or_raise(|| ErrorKind::Remote(message))
        },
    }
}

/// Lowercase hex SHA-256 of a file, computed off the async runtime.
async fn sha256_file(path: PathBuf) -> ImportResult<String> {
    tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let mut reader = BufReader::new(File::open(&path)?);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0; HASH_BUFFER];
        loop {
            let read = reader.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .or_raise(|| ErrorKind::Io)?
    .or_raise(|| ErrorKind::Io)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind as LibraryErrorKind;
    use libra_api::{MockRemote, Tokens};
    use libra_store::Database;
    use std::sync::Arc;

    // sha256("hello world\n")
    const HELLO_SHA: &str = "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447";

    struct Fixture {
        _dir: tempfile::TempDir,
        source: PathBuf,
        books: PathBuf,
        repo: Repository,
        remote: Arc<MockRemote>,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("hello.txt");
        std::fs::write(&source, "hello world\n").unwrap();
        let db = Database::connect_in_memory().await.unwrap();
        Fixture {
            books: dir.path().join("books"),
            source,
            _dir: dir,
            repo: Repository::from(&db),
            remote: Arc::new(MockRemote::default().with_tokens(Tokens::new("a", "r"))),
        }
    }

    fn request(source: &Path) -> ImportRequest {
        ImportRequest {
            source: source.to_path_buf(),
            title: "Hello".into(),
            description: Some("  ".into()),
            language_code: Some("en".into()),
            format: None,
        }
    }

    #[tokio::test]
    async fn test_import_copies_and_registers() {
        let f = fixture().await;
        let outcome = import_book(&*f.remote, &f.repo, &f.books, &request(&f.source), false).await.unwrap();
        let ImportOutcome::Imported(ebook) = outcome else {
            panic!("expected an import, got {outcome:?}");
        };
        let expected = f.books.join(format!("{HELLO_SHA}.txt"));
        assert!(expected.exists());
        assert_eq!(ebook.file_path.as_deref(), Some(expected.to_str().unwrap()));

        let created = f.remote.created_ebooks();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].checksum_sha256, HELLO_SHA);
        assert_eq!(created[0].file_size_bytes, 12);
        assert_eq!(created[0].format, "txt");
        assert_eq!(created[0].description, None);
        assert_eq!(created[0].storage_key, expected.to_str().unwrap());
        assert!(f.repo.ebook(ebook.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_needs_confirmation() {
        let f = fixture().await;
        std::fs::create_dir_all(&f.books).unwrap();
        let existing = f.books.join(format!("{HELLO_SHA}.txt"));
        std::fs::write(&existing, "hello world\n").unwrap();

        let outcome = import_book(&*f.remote, &f.repo, &f.books, &request(&f.source), false).await.unwrap();
        let ImportOutcome::Duplicate(duplicate) = outcome else {
            panic!("expected a duplicate, got {outcome:?}");
        };
        assert_eq!(duplicate.local_path.as_deref(), Some(existing.as_path()));
        assert_eq!(std::fs::read_dir(&f.books).unwrap().count(), 1);
        assert!(f.remote.created_ebooks().is_empty());

        let outcome = import_book(&*f.remote, &f.repo, &f.books, &request(&f.source), true).await.unwrap();
        assert!(matches!(outcome, ImportOutcome::Imported(_)));
        let created = f.remote.created_ebooks();
        assert_eq!(created.len(), 1);
        let key = Path::new(&created[0].storage_key).file_name().unwrap().to_str().unwrap().to_string();
        assert!(key.starts_with(&format!("{HELLO_SHA}-")), "{key}");
        assert!(key.ends_with(".txt"));
        assert_eq!(std::fs::read_dir(&f.books).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_remote_checksum_counts_as_duplicate() {
        let f = fixture().await;
        let known: Ebook = serde_json::from_value(serde_json::json!({
            "id": "0b6e4c1a-3f0e-4a51-9d4a-8b8f2f6c9e01",
            "title": "Hello again",
            "format": "txt",
            "checksumSha256": HELLO_SHA.to_uppercase(),
        }))
        .unwrap();
        let remote = MockRemote::default().with_tokens(Tokens::new("a", "r")).with_ebooks([known]);
        let outcome = import_book(&remote, &f.repo, &f.books, &request(&f.source), false).await.unwrap();
        let ImportOutcome::Duplicate(duplicate) = outcome else {
            panic!("expected a duplicate, got {outcome:?}");
        };
        assert!(duplicate.local_path.is_none());
        assert_eq!(duplicate.remote.unwrap().title, "Hello again");
        assert!(!f.books.exists());
    }

    #[tokio::test]
    async fn test_failed_create_removes_copy() {
        let f = fixture().await;
        std::fs::create_dir_all(&f.books).unwrap();
        std::fs::write(f.books.join(format!("{HELLO_SHA}.txt")), "hello world\n").unwrap();
        f.remote.fail_transient("create ebook");

        let err = import_book(&*f.remote, &f.repo, &f.books, &request(&f.source), true).await.unwrap_err();
        assert_eq!(*err, LibraryErrorKind::Remote("create ebook failed (503): service unavailable".into()));
        // Only the pre-existing copy is left.
        assert_eq!(std::fs::read_dir(&f.books).unwrap().count(), 1);
        assert!(f.repo.active_ebooks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation() {
        let f = fixture().await;
        let mut req = request(&f.source);
        req.title = " ".into();
        let err = import_book(&*f.remote, &f.repo, &f.books, &req, false).await.unwrap_err();
        assert_eq!(*err, LibraryErrorKind::Validation("title is required".into()));

        let mut req = request(&f.source);
        req.format = Some("mobi".into());
        let err = import_book(&*f.remote, &f.repo, &f.books, &req, false).await.unwrap_err();
        assert_eq!(*err, LibraryErrorKind::Validation("unsupported document format".into()));

        let mut req = request(&f.source);
        req.source = f.books.join("missing.epub");
        let err = import_book(&*f.remote, &f.repo, &f.books, &req, false).await.unwrap_err();
        assert!(matches!(&*err, LibraryErrorKind::Validation(m) if m.starts_with("file not found")));
        assert!(f.remote.calls().is_empty());
    }
}
