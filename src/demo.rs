//! A bookshelf schema: the fixture behind the CLI `query` command, the
//! integration tests and the case runner.
//!
//! Books and authors link to each other (`Book.author`, `Author.books`), and
//! both views hold an `Arc` of the shared [`Shelf`]. Mutations lock the shelf.
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::{FieldError, SchemaError};
use crate::reflect::{
    Arguments, Enum, Id, InputDescriptor, InputField, InputType, ObjDescriptor, OutputType, Reflector, Resolved,
    Upload,
};
use crate::resolve::Ctx;
use crate::schema::Schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Genre {
    Fantasy,
    ScienceFiction,
    Mystery,
    Poetry,
}

impl Enum for Genre {
    const NAME: &'static str = "Genre";
    const DESCRIPTION: Option<&'static str> = Some("Shelf section a book is filed under.");

    fn symbols() -> &'static [&'static str] {
        &["FANTASY", "SCIENCE_FICTION", "MYSTERY", "POETRY"]
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Fantasy => "FANTASY",
            Self::ScienceFiction => "SCIENCE_FICTION",
            Self::Mystery => "MYSTERY",
            Self::Poetry => "POETRY",
        }
    }
}

impl OutputType for Genre {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.enum_type::<Self>()
    }

    fn resolve(&self) -> Resolved<'_> {
        Resolved::Enum(self.symbol())
    }

    fn resolve_owned<'a>(self) -> Resolved<'a> {
        Resolved::Enum(self.symbol())
    }
}

impl InputType for Genre {
    fn describe(r: &mut Reflector) -> Result<InputDescriptor, SchemaError> {
        r.input_enum::<Self>()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// STORE
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
struct BookRecord {
    id: i64,
    title: String,
    author_id: i64,
    genre: Genre,
    year: Option<i32>,
    ratings: Vec<u8>,
    cover: Option<Cover>,
}

#[derive(Debug, Clone)]
struct AuthorRecord {
    id: i64,
    name: String,
}

#[derive(Debug, Default)]
struct Store {
    books: Vec<BookRecord>,
    authors: Vec<AuthorRecord>,
}

/// The mutable state behind both roots.
#[derive(Debug, Default)]
pub struct Shelf {
    store: Mutex<Store>,
}

impl Shelf {
    /// Four books by three authors.
    pub fn seeded() -> Self {
        let authors = [(1, "Ursula K. Le Guin"), (2, "Isaac Asimov"), (3, "Agatha Christie")]
            .into_iter()
            .map(|(id, name)| AuthorRecord { id, name: name.to_string() })
            .collect();
        let books = [
            (1, "A Wizard of Earthsea", 1, Genre::Fantasy, 1968, vec![5, 4]),
            (2, "The Left Hand of Darkness", 1, Genre::ScienceFiction, 1969, vec![]),
            (3, "Foundation", 2, Genre::ScienceFiction, 1951, vec![4]),
            (4, "Murder on the Orient Express", 3, Genre::Mystery, 1934, vec![5, 4, 3]),
        ]
        .into_iter()
        .map(|(id, title, author_id, genre, year, ratings)| BookRecord {
            id,
            title: title.to_string(),
            author_id,
            genre,
            year: Some(year),
            ratings,
            cover: None,
        })
        .collect();
        Self { store: Mutex::new(Store { books, authors }) }
    }

    fn store(&self) -> Result<MutexGuard<'_, Store>, FieldError> {
        self.store.lock().map_err(|_| FieldError::new("shelf store is poisoned"))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// VIEWS
// ————————————————————————————————————————————————————————————————————————————

pub struct Book {
    shelf: Arc<Shelf>,
    record: BookRecord,
}

impl Book {
    fn new(shelf: &Arc<Shelf>, record: BookRecord) -> Self {
        Self { shelf: Arc::clone(shelf), record }
    }

    fn rating(&self) -> Option<f64> {
        let ratings = &self.record.ratings;
        if ratings.is_empty() {
            return None;
        }
        let total: u32 = ratings.iter().map(|&r| u32::from(r)).sum();
        Some(f64::from(total) / ratings.len() as f64)
    }
}

impl OutputType for Book {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("Book", |b| {
            b.description("A book on the shelf.");
            b.computed("id", |book| Id(book.record.id))?;
            b.field("title", |book| &book.record.title)?;
            b.field("genre", |book| &book.record.genre)?;
            b.field("year", |book| &book.record.year)?.doc("Year of first publication.");
            b.computed("rating", Book::rating)?.doc("Mean of all ratings; null when unrated.");
            b.computed("rating_count", |book| book.record.ratings.len())?;
            b.method("author", |book, _, ()| {
                let store = book.shelf.store()?;
                let author = store
                    .authors
                    .iter()
                    .find(|a| a.id == book.record.author_id)
                    .cloned()
                    .ok_or_else(|| FieldError::new(format!("author {} is missing", book.record.author_id)))?;
                Ok::<_, FieldError>(Author::new(&book.shelf, author))
            })?;
            b.field("cover", |book| &book.record.cover)?;
            Ok(())
        })
    }
}

pub struct Author {
    shelf: Arc<Shelf>,
    record: AuthorRecord,
}

impl Author {
    fn new(shelf: &Arc<Shelf>, record: AuthorRecord) -> Self {
        Self { shelf: Arc::clone(shelf), record }
    }
}

impl OutputType for Author {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("Author", |b| {
            b.computed("id", |author| Id(author.record.id))?;
            b.field("name", |author| &author.record.name)?;
            b.method("books", |author, _, ()| {
                let store = author.shelf.store()?;
                let books = store
                    .books
                    .iter()
                    .filter(|book| book.author_id == author.record.id)
                    .map(|book| Book::new(&author.shelf, book.clone()))
                    .collect::<Vec<_>>();
                Ok::<_, FieldError>(books)
            })?;
            Ok(())
        })
    }
}

#[derive(Debug, Clone)]
pub struct Cover {
    file_name: String,
    content_type: Option<String>,
    size: usize,
}

impl OutputType for Cover {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("Cover", |b| {
            b.field("file_name", |cover| &cover.file_name)?;
            b.field("content_type", |cover| &cover.content_type)?;
            b.field("size", |cover| &cover.size)?.doc("Bytes.");
            Ok(())
        })
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ARGUMENTS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Deserialize)]
struct BooksArgs {
    genre: Option<Genre>,
}

impl Arguments for BooksArgs {
    fn describe(r: &mut Reflector) -> Result<Vec<InputField>, SchemaError> {
        r.arguments("BooksArgs", |b| {
            b.field::<Option<Genre>>("genre")?.doc("Only books of this genre.");
            Ok(())
        })
    }
}

#[derive(Deserialize)]
struct BookArgs {
    id: Id<i64>,
}

impl Arguments for BookArgs {
    fn describe(r: &mut Reflector) -> Result<Vec<InputField>, SchemaError> {
        r.arguments("BookArgs", |b| {
            b.field::<Id<i64>>("id")?;
            Ok(())
        })
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    term: String,
    limit: i32,
}

impl Arguments for SearchArgs {
    fn describe(r: &mut Reflector) -> Result<Vec<InputField>, SchemaError> {
        r.arguments("SearchArgs", |b| {
            b.field::<String>("term")?.doc("Case-insensitive title fragment.");
            b.field_with_default::<i32>("limit", 10)?;
            Ok(())
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct BookInput {
    title: String,
    author: String,
    genre: Genre,
    year: Option<i32>,
}

impl InputType for BookInput {
    fn describe(r: &mut Reflector) -> Result<InputDescriptor, SchemaError> {
        r.input_object::<Self, _>("BookInput", |b| {
            b.description("A new book.");
            b.field::<String>("title")?;
            b.field::<String>("author")?.doc("Author name; unknown authors are added.");
            b.field_with_default::<Genre>("genre", Genre::Fantasy)?;
            b.field::<Option<i32>>("year")?;
            Ok(())
        })
    }
}

#[derive(Deserialize)]
struct AddBookArgs {
    input: BookInput,
}

impl Arguments for AddBookArgs {
    fn describe(r: &mut Reflector) -> Result<Vec<InputField>, SchemaError> {
        r.arguments("AddBookArgs", |b| {
            b.field::<BookInput>("input")?;
            Ok(())
        })
    }
}

#[derive(Deserialize)]
struct RateBookArgs {
    id: Id<i64>,
    stars: i32,
}

impl Arguments for RateBookArgs {
    fn describe(r: &mut Reflector) -> Result<Vec<InputField>, SchemaError> {
        r.arguments("RateBookArgs", |b| {
            b.field::<Id<i64>>("id")?;
            b.field::<i32>("stars")?.doc("1 to 5.");
            Ok(())
        })
    }
}

#[derive(Deserialize)]
struct UploadCoverArgs {
    book_id: Id<i64>,
    file: Upload,
}

impl Arguments for UploadCoverArgs {
    fn describe(r: &mut Reflector) -> Result<Vec<InputField>, SchemaError> {
        r.arguments("UploadCoverArgs", |b| {
            b.field::<Id<i64>>("book_id")?;
            b.field::<Upload>("file")?;
            Ok(())
        })
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ROOTS
// ————————————————————————————————————————————————————————————————————————————

pub struct QueryRoot {
    shelf: Arc<Shelf>,
}

impl QueryRoot {
    fn books(&self, _: &Ctx<'_>, args: BooksArgs) -> Result<Vec<Book>, FieldError> {
        let store = self.shelf.store()?;
        Ok(store
            .books
            .iter()
            .filter(|book| args.genre.is_none_or(|genre| book.genre == genre))
            .map(|book| Book::new(&self.shelf, book.clone()))
            .collect())
    }

    fn search(&self, _: &Ctx<'_>, args: SearchArgs) -> Result<Vec<Book>, FieldError> {
        let limit = usize::try_from(args.limit).map_err(|_| FieldError::new("limit must not be negative"))?;
        let term = args.term.to_lowercase();
        let store = self.shelf.store()?;
        Ok(store
            .books
            .iter()
            .filter(|book| book.title.to_lowercase().contains(&term))
            .take(limit)
            .map(|book| Book::new(&self.shelf, book.clone()))
            .collect())
    }
}

impl OutputType for QueryRoot {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("Query", |b| {
            b.method("books", QueryRoot::books)?;
            b.method("book", |root, _, args: BookArgs| {
                let store = root.shelf.store()?;
                let found = store.books.iter().find(|book| book.id == args.id.0).cloned();
                Ok::<_, FieldError>(found.map(|book| Book::new(&root.shelf, book)))
            })?;
            b.method("authors", |root, _, ()| {
                let store = root.shelf.store()?;
                let authors = store.authors.iter().map(|a| Author::new(&root.shelf, a.clone())).collect::<Vec<_>>();
                Ok::<_, FieldError>(authors)
            })?;
            b.method("search", QueryRoot::search)?;
            Ok(())
        })
    }
}

pub struct MutationRoot {
    shelf: Arc<Shelf>,
}

impl MutationRoot {
    fn add_book(&self, _: &Ctx<'_>, args: AddBookArgs) -> Result<Book, FieldError> {
        let BookInput { title, author, genre, year } = args.input;
        if title.trim().is_empty() {
            return Err(FieldError::new("title must not be empty").with_extension("code", "BAD_INPUT"));
        }
        let mut store = self.shelf.store()?;
        let author_id = match store.authors.iter().find(|a| a.name == author) {
            Some(existing) => existing.id,
            None => {
                let id = store.authors.iter().map(|a| a.id).max().unwrap_or(0) + 1;
                store.authors.push(AuthorRecord { id, name: author });
                id
            }
        };
        let id = store.books.iter().map(|b| b.id).max().unwrap_or(0) + 1;
        let record = BookRecord { id, title, author_id, genre, year, ratings: Vec::new(), cover: None };
        store.books.push(record.clone());
        tracing::debug!(id, "added book");
        Ok(Book::new(&self.shelf, record))
    }

    fn rate_book(&self, _: &Ctx<'_>, args: RateBookArgs) -> Result<Book, FieldError> {
        let stars = u8::try_from(args.stars)
            .ok()
            .filter(|stars| (1..=5).contains(stars))
            .ok_or_else(|| {
                FieldError::new(format!("stars must be between 1 and 5, got {}", args.stars))
                    .with_extension("code", "BAD_RATING")
            })?;
        let mut store = self.shelf.store()?;
        let book = store
            .books
            .iter_mut()
            .find(|book| book.id == args.id.0)
            .ok_or_else(|| FieldError::new(format!("no book with id {}", args.id.0)))?;
        book.ratings.push(stars);
        Ok(Book::new(&self.shelf, book.clone()))
    }

    fn upload_cover(&self, ctx: &Ctx<'_>, args: UploadCoverArgs) -> Result<Book, FieldError> {
        let file = ctx.upload(&args.file)?;
        let mut store = self.shelf.store()?;
        let book = store
            .books
            .iter_mut()
            .find(|book| book.id == args.book_id.0)
            .ok_or_else(|| FieldError::new(format!("no book with id {}", args.book_id.0)))?;
        book.cover = Some(Cover {
            file_name: file.file_name.clone(),
            content_type: file.content_type.clone(),
            size: file.data.len(),
        });
        Ok(Book::new(&self.shelf, book.clone()))
    }
}

impl OutputType for MutationRoot {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("Mutation", |b| {
            b.method("add_book", MutationRoot::add_book)?;
            b.method("rate_book", MutationRoot::rate_book)?;
            b.method("upload_cover", MutationRoot::upload_cover)?;
            Ok(())
        })
    }
}

pub fn schema() -> Result<Schema, SchemaError> {
    Schema::builder().register_enum::<Genre>()?.build::<QueryRoot, MutationRoot>()
}

/// Both roots over one freshly seeded shelf.
pub fn roots() -> (QueryRoot, MutationRoot) {
    let shelf = Arc::new(Shelf::seeded());
    (QueryRoot { shelf: Arc::clone(&shelf) }, MutationRoot { shelf })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use serde_json::json;

    #[test]
    fn schema_builds() {
        let schema = schema().unwrap();
        assert_eq!(schema.query_type().name, "Query");
        assert!(schema.input_object("BookInput").is_some());
        assert!(schema.registry().is_scalar("Upload"));
    }

    #[test]
    fn introspected_arguments_are_sorted_by_name() {
        let schema = schema().unwrap();
        let (query, mutation) = roots();
        let response = schema.execute(
            &query,
            &mutation,
            Request::new(r#"{ __type(name: "Query") { fields { name args { name defaultValue } } } }"#),
        );
        assert!(response.is_ok(), "{:?}", response.errors);
        let fields = response.data["__type"]["fields"].as_array().unwrap();
        let search = fields.iter().find(|f| f["name"] == "search").unwrap();
        assert_eq!(
            search["args"],
            json!([{"name": "limit", "defaultValue": "10"}, {"name": "term", "defaultValue": null}])
        );
    }

    #[test]
    fn int_arguments_outside_32_bits_are_rejected() {
        let schema = schema().unwrap();
        let (query, mutation) = roots();
        let response = schema.execute(
            &query,
            &mutation,
            Request::new(r#"{ search(term: "the", limit: 3000000000) { title } }"#),
        );
        assert_eq!(response.data, serde_json::Value::Null);
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].message.contains("32-bit"), "{}", response.errors[0].message);

        let variables = crate::value::Variables::from_json(json!({"n": -3000000000i64}));
        let response = schema.execute(
            &query,
            &mutation,
            Request::new(r#"query($n: Int!) { search(term: "the", limit: $n) { title } }"#).variables(variables),
        );
        assert_eq!(response.data, serde_json::Value::Null);
        assert!(response.errors[0].message.contains("32-bit"), "{}", response.errors[0].message);
    }

    #[test]
    fn cyclic_links_resolve() {
        let schema = schema().unwrap();
        let (query, mutation) = roots();
        let response = schema.execute(
            &query,
            &mutation,
            Request::new(r#"{ book(id: "3") { title author { name books { title } } } }"#),
        );
        assert!(response.is_ok(), "{:?}", response.errors);
        assert_eq!(
            response.data,
            json!({"book": {"title": "Foundation", "author": {"name": "Isaac Asimov", "books": [{"title": "Foundation"}]}}})
        );
    }

    #[test]
    fn mutations_share_the_shelf() {
        let schema = schema().unwrap();
        let (query, mutation) = roots();
        let added = schema.execute(
            &query,
            &mutation,
            Request::new(r#"mutation { addBook(input: {title: "Lathe of Heaven", author: "Ursula K. Le Guin"}) { id genre } }"#),
        );
        assert_eq!(added.data, json!({"addBook": {"id": "5", "genre": "FANTASY"}}));
        let listed = schema.execute(&query, &mutation, Request::new("{ books(genre: FANTASY) { title } }"));
        assert_eq!(
            listed.data,
            json!({"books": [{"title": "A Wizard of Earthsea"}, {"title": "Lathe of Heaven"}]})
        );
    }
}
