use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use shared_models::pagination::Pagination;

use crate::supabase::{DbError, SupabaseClient};

/// A row type stored in its own table.
pub trait Entity: DeserializeOwned + Send + Sync {
    const TABLE: &'static str;

    fn id(&self) -> i64;
}

/// PostgREST filter builder. Values are url-encoded when rendered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    params: Vec<(String, String)>,
    order: Option<String>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, column: &str, operator: &str, value: impl Display) -> Self {
        self.params
            .push((column.to_string(), format!("{}.{}", operator, value)));
        self
    }

    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.push(column, "eq", value)
    }

    pub fn neq(self, column: &str, value: impl Display) -> Self {
        self.push(column, "neq", value)
    }

    pub fn gt(self, column: &str, value: impl Display) -> Self {
        self.push(column, "gt", value)
    }

    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.push(column, "gte", value)
    }

    pub fn lt(self, column: &str, value: impl Display) -> Self {
        self.push(column, "lt", value)
    }

    pub fn lte(self, column: &str, value: impl Display) -> Self {
        self.push(column, "lte", value)
    }

    /// Case-insensitive substring match.
    pub fn ilike(self, column: &str, needle: &str) -> Self {
        self.push(column, "ilike", format!("*{}*", sanitize_pattern(needle)))
    }

    pub fn in_list<V: Display>(self, column: &str, values: &[V]) -> Self {
        let joined = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.push(column, "in", format!("({})", joined))
    }

    /// Matches when any of the given columns contains `needle`.
    pub fn any_ilike(mut self, columns: &[&str], needle: &str) -> Self {
        let needle = sanitize_pattern(needle);
        let clauses = columns
            .iter()
            .map(|column| format!("{}.ilike.*{}*", column, needle))
            .collect::<Vec<_>>()
            .join(",");
        self.params.push(("or".to_string(), format!("({})", clauses)));
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.order = Some(format!("{}.{}", column, direction));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Renders the filters, ordering and pagination as a query string
    /// without the leading `?`.
    pub fn to_query_string(&self, pagination: Option<Pagination>) -> String {
        let mut parts: Vec<String> = self
            .params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect();

        if let Some(order) = &self.order {
            parts.push(format!("order={}", order));
        }

        if let Some(page) = pagination {
            parts.push(format!("limit={}", page.limit));
            parts.push(format!("offset={}", page.offset));
        }

        parts.join("&")
    }
}

// PostgREST reserves these characters inside filter values.
fn sanitize_pattern(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '*' | '(' | ')' | ',' | '%'))
        .collect()
}

/// Generic create/read/update/delete operations over one table.
pub struct CrudRepository<T: Entity> {
    client: Arc<SupabaseClient>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for CrudRepository<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> CrudRepository<T> {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self {
            client,
            _entity: PhantomData,
        }
    }

    fn table_path() -> String {
        format!("/rest/v1/{}", T::TABLE)
    }

    fn path_with(query: &str) -> String {
        if query.is_empty() {
            Self::table_path()
        } else {
            format!("{}?{}", Self::table_path(), query)
        }
    }

    fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    pub async fn create<P>(&self, payload: &P) -> Result<T, DbError>
    where
        P: Serialize + ?Sized,
    {
        debug!("Inserting row into {}", T::TABLE);

        let mut body = serde_json::to_value(payload)?;
        if let Value::Object(map) = &mut body {
            let now = json!(Utc::now().to_rfc3339());
            map.entry("created_at").or_insert_with(|| now.clone());
            map.entry("updated_at").or_insert(now);
        }

        let rows: Vec<T> = self
            .client
            .request_with_headers(
                Method::POST,
                &Self::table_path(),
                Some(body),
                Some(Self::representation_headers()),
            )
            .await?;

        rows.into_iter().next().ok_or(DbError::EmptyResult)
    }

    pub async fn get(&self, id: i64) -> Result<Option<T>, DbError> {
        self.find_one(&Filters::new().eq("id", id)).await
    }

    pub async fn find_one(&self, filters: &Filters) -> Result<Option<T>, DbError> {
        let query = filters.to_query_string(Some(Pagination { limit: 1, offset: 0 }));
        let rows: Vec<T> = self
            .client
            .request(Method::GET, &Self::path_with(&query), None)
            .await?;

        Ok(rows.into_iter().next())
    }

    pub async fn list(&self, filters: &Filters, pagination: Pagination) -> Result<Vec<T>, DbError> {
        let query = filters.to_query_string(Some(pagination));
        debug!("Listing {} with query: {}", T::TABLE, query);

        self.client
            .request(Method::GET, &Self::path_with(&query), None)
            .await
    }

    pub async fn exists(&self, filters: &Filters) -> Result<bool, DbError> {
        Ok(self.find_one(filters).await?.is_some())
    }

    pub async fn count(&self, filters: &Filters) -> Result<usize, DbError> {
        let mut query = filters.to_query_string(None);
        if query.is_empty() {
            query.push_str("select=id");
        } else {
            query.push_str("&select=id");
        }

        self.client.count(&Self::path_with(&query)).await
    }

    /// Applies a partial update. Returns `None` when no row has this id.
    pub async fn update(&self, id: i64, mut changes: Map<String, Value>) -> Result<Option<T>, DbError> {
        debug!("Updating {} row {}", T::TABLE, id);

        changes.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let query = Filters::new().eq("id", id).to_query_string(None);
        let rows: Vec<T> = self
            .client
            .request_with_headers(
                Method::PATCH,
                &Self::path_with(&query),
                Some(Value::Object(changes)),
                Some(Self::representation_headers()),
            )
            .await?;

        Ok(rows.into_iter().next())
    }

    /// Returns whether a row was deleted.
    pub async fn delete(&self, id: i64) -> Result<bool, DbError> {
        debug!("Deleting {} row {}", T::TABLE, id);

        let query = Filters::new().eq("id", id).to_query_string(None);
        let rows: Vec<Value> = self
            .client
            .request_with_headers(
                Method::DELETE,
                &Self::path_with(&query),
                None,
                Some(Self::representation_headers()),
            )
            .await?;

        Ok(!rows.is_empty())
    }
}
