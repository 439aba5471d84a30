//! LanceDB-backed [`VectorStore`]: `lancedb::connect`, `create_table`,
//! `vector_search().column("vector").limit(k).execute()`,
//! `table.delete(&filter)`, and a `FixedSizeListArray`-based
//! `rows_to_record_batch_reader`.

use std::sync::Arc;

use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array, UInt64Array, UInt8Array,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;

use crate::error::{HtmError, Result};

use super::{Predicate, SearchHit, StoredRow, VectorStore};

const TABLE_NAME: &str = "htm_entries";

pub struct LanceVectorStore {
    db: lancedb::Connection,
    table: tokio::sync::Mutex<Option<Table>>,
    dim: usize,
}

impl LanceVectorStore {
    async fn table(&self) -> Result<Table> {
        let guard = self.table.lock().await;
        guard
            .clone()
            .ok_or_else(|| HtmError::StoreError("table not created yet".to_string()))
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn create_table(&self, _dim: usize) -> Result<()> {
        let batch_reader = rows_to_record_batch_reader(&[], self.dim)?;
        let table = self
            .db
            .create_table(TABLE_NAME, batch_reader)
            .execute()
            .await
            .map_err(|e| HtmError::StoreError(e.to_string()))?;
        *self.table.lock().await = Some(table);
        Ok(())
    }

    async fn open_or_create(path: &str, dim: usize) -> Result<Self> {
        let db = lancedb::connect(path)
            .execute()
            .await
            .map_err(|e| HtmError::StoreError(e.to_string()))?;

        let table = match db.open_table(TABLE_NAME).execute().await {
            Ok(t) => Some(t),
            Err(_) => None,
        };

        let store = Self {
            db,
            table: tokio::sync::Mutex::new(table),
            dim,
        };
        if store.table.lock().await.is_none() {
            store.create_table(dim).await?;
        }
        Ok(store)
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        predicate: Option<Predicate>,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        let table = self.table().await?;
        let mut query = table
            .vector_search(query_vec.to_vec())
            .map_err(|e| HtmError::StoreError(e.to_string()))?
            .column("vector");

        if let Some(predicate) = &predicate {
            query = query.only_if(compile_predicate(predicate));
        }
        let query = query.limit(limit.unwrap_or(usize::MAX.min(10_000)));

        let mut stream = query
            .execute()
            .await
            .map_err(|e| HtmError::StoreError(e.to_string()))?;

        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| HtmError::StoreError(e.to_string()))? {
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>().cloned());
            for (i, row) in record_batch_to_rows(&batch)?.into_iter().enumerate() {
                let distance = distances.as_ref().map_or(0.0, |d| d.value(i));
                hits.push(SearchHit { row, distance });
            }
        }
        Ok(hits)
    }

    async fn query(&self, predicate: Predicate, limit: Option<usize>) -> Result<Vec<StoredRow>> {
        let table = self.table().await?;
        let mut query = table.query().only_if(compile_predicate(&predicate));
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        let mut stream = query
            .execute()
            .await
            .map_err(|e| HtmError::StoreError(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| HtmError::StoreError(e.to_string()))? {
            out.extend(record_batch_to_rows(&batch)?);
        }
        Ok(out)
    }

    async fn upsert_batch(&self, rows: Vec<StoredRow>) -> Result<()> {
        for row in &rows {
            if row.vector.len() != self.dim {
                return Err(HtmError::DimensionMismatch {
                    id: row.id.clone(),
                    expected: self.dim,
                    actual: row.vector.len(),
                });
            }
        }
        let table = self.table().await?;
        let batch_reader = rows_to_record_batch_reader(&rows, self.dim)?;
        table
            .add(batch_reader)
            .execute()
            .await
            .map_err(|e| HtmError::StoreError(e.to_string()))?;
        Ok(())
    }

    async fn delete_where(&self, predicate: Predicate) -> Result<usize> {
        let table = self.table().await?;
        let before = table.count_rows(None).await.unwrap_or(0);
        table
            .delete(&compile_predicate(&predicate))
            .await
            .map_err(|e| HtmError::StoreError(e.to_string()))?;
        let after = table.count_rows(None).await.unwrap_or(before);
        Ok(before.saturating_sub(after))
    }
}

fn compile_predicate(predicate: &Predicate) -> String {
    fn escape(s: &str) -> String {
        s.replace('\'', "''")
    }
    match predicate {
        Predicate::LanguageEq(lang) => format!("language = '{}'", escape(lang)),
        Predicate::IdEq(id) => format!("id = '{}'", escape(id)),
        Predicate::IdStartsWith(prefix) => format!("id LIKE '{}%'", escape(prefix)),
        Predicate::IdIn(ids) => {
            let list = ids
                .iter()
                .map(|id| format!("'{}'", escape(id)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("id IN ({list})")
        }
        Predicate::And(a, b) => format!("({}) AND ({})", compile_predicate(a), compile_predicate(b)),
    }
}

fn nullable_string_array(values: &[StoredRow], get: impl Fn(&StoredRow) -> Option<String>) -> ArrayRef {
    Arc::new(StringArray::from(values.iter().map(get).collect::<Vec<_>>()))
}

fn schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("language", DataType::Utf8, false),
        Field::new("pure_text", DataType::Utf8, false),
        Field::new("element", DataType::Utf8, false),
        Field::new("file_id", DataType::Utf8, false),
        Field::new("original", DataType::Utf8, false),
        Field::new("unit_id", DataType::Utf8, false),
        Field::new("segment_index", DataType::UInt32, false),
        Field::new("segment_count", DataType::UInt32, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, false)), dim as i32),
            false,
        ),
        Field::new("state", DataType::Utf8, true),
        Field::new("sub_state", DataType::Utf8, true),
        Field::new("quality", DataType::UInt8, true),
        Field::new("creation_date", DataType::Utf8, true),
        Field::new("creation_id", DataType::Utf8, true),
        Field::new("change_date", DataType::Utf8, true),
        Field::new("change_id", DataType::Utf8, true),
        Field::new("creation_tool", DataType::Utf8, true),
        Field::new("creation_tool_version", DataType::Utf8, true),
        Field::new("context", DataType::Utf8, true),
        Field::new("last_usage_date", DataType::Utf8, true),
        Field::new("usage_count", DataType::UInt64, true),
        Field::new("notes_json", DataType::Utf8, true),
        Field::new("properties_json", DataType::Utf8, true),
        Field::new("segment_json", DataType::Utf8, true),
    ]))
}

fn rows_to_record_batch_reader(
    rows: &[StoredRow],
    dim: usize,
) -> Result<Box<dyn arrow_array::RecordBatchReader + Send>> {
    let schema = schema(dim);

    let mut flat: Vec<f32> = Vec::with_capacity(rows.len() * dim);
    for row in rows {
        flat.extend_from_slice(&row.vector);
    }
    let values: ArrayRef = Arc::new(Float32Array::from(flat));
    let item_field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_arr: ArrayRef = Arc::new(
        FixedSizeListArray::try_new(item_field, dim as i32, values, None)
            .map_err(|e| HtmError::StoreError(e.to_string()))?,
    );

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(rows.iter().map(|r| r.id.clone()).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|r| r.language.clone()).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|r| r.pure_text.clone()).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|r| r.element.clone()).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|r| r.file_id.clone()).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|r| r.original.clone()).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|r| r.unit_id.clone()).collect::<Vec<_>>())),
        Arc::new(UInt32Array::from(rows.iter().map(|r| r.segment_index).collect::<Vec<_>>())),
        Arc::new(UInt32Array::from(rows.iter().map(|r| r.segment_count).collect::<Vec<_>>())),
        vector_arr,
        nullable_string_array(rows, |r| r.state.clone()),
        nullable_string_array(rows, |r| r.sub_state.clone()),
        Arc::new(UInt8Array::from(rows.iter().map(|r| r.quality).collect::<Vec<_>>())),
        nullable_string_array(rows, |r| r.creation_date.clone()),
        nullable_string_array(rows, |r| r.creation_id.clone()),
        nullable_string_array(rows, |r| r.change_date.clone()),
        nullable_string_array(rows, |r| r.change_id.clone()),
        nullable_string_array(rows, |r| r.creation_tool.clone()),
        nullable_string_array(rows, |r| r.creation_tool_version.clone()),
        nullable_string_array(rows, |r| r.context.clone()),
        nullable_string_array(rows, |r| r.last_usage_date.clone()),
        Arc::new(UInt64Array::from(rows.iter().map(|r| r.usage_count).collect::<Vec<_>>())),
        nullable_string_array(rows, |r| r.notes_json.clone()),
        nullable_string_array(rows, |r| r.properties_json.clone()),
        nullable_string_array(rows, |r| r.segment_json.clone()),
    ];

    let batch = RecordBatch::try_new(schema.clone(), columns).map_err(|e| HtmError::StoreError(e.to_string()))?;
    let iter = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);
    Ok(Box::new(iter))
}

fn record_batch_to_rows(batch: &RecordBatch) -> Result<Vec<StoredRow>> {
    let col = |name: &str| -> Result<ArrayRef> {
        batch
            .column_by_name(name)
            .cloned()
            .ok_or_else(|| HtmError::StoreError(format!("missing column `{name}`")))
    };
    let str_col = |name: &str| -> Result<Arc<StringArray>> {
        col(name)?
            .as_any()
            .downcast_ref::<StringArray>()
            .cloned()
            .map(Arc::new)
            .ok_or_else(|| HtmError::StoreError(format!("column `{name}` is not a string array")))
    };

    let id = str_col("id")?;
    let language = str_col("language")?;
    let pure_text = str_col("pure_text")?;
    let element = str_col("element")?;
    let file_id = str_col("file_id")?;
    let original = str_col("original")?;
    let unit_id = str_col("unit_id")?;
    let segment_index = col("segment_index")?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .cloned()
        .ok_or_else(|| HtmError::StoreError("segment_index is not UInt32".to_string()))?;
    let segment_count = col("segment_count")?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .cloned()
        .ok_or_else(|| HtmError::StoreError("segment_count is not UInt32".to_string()))?;
    let vector_col = col("vector")?;
    let vector_list = vector_col
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or_else(|| HtmError::StoreError("vector is not a FixedSizeList".to_string()))?;

    let state = str_col("state")?;
    let sub_state = str_col("sub_state")?;
    let quality = col("quality")?.as_any().downcast_ref::<UInt8Array>().cloned();
    let creation_date = str_col("creation_date")?;
    let creation_id = str_col("creation_id")?;
    let change_date = str_col("change_date")?;
    let change_id = str_col("change_id")?;
    let creation_tool = str_col("creation_tool")?;
    let creation_tool_version = str_col("creation_tool_version")?;
    let context = str_col("context")?;
    let last_usage_date = str_col("last_usage_date")?;
    let usage_count = col("usage_count")?.as_any().downcast_ref::<UInt64Array>().cloned();
    let notes_json = str_col("notes_json")?;
    let properties_json = str_col("properties_json")?;
    let segment_json = str_col("segment_json")?;

    let opt = |arr: &StringArray, i: usize| -> Option<String> {
        if arr.is_valid(i) {
            Some(arr.value(i).to_string())
        } else {
            None
        }
    };

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let vector_value = vector_list.value(i);
        let vector = vector_value
            .as_any()
            .downcast_ref::<Float32Array>()
            .map(|a| a.values().to_vec())
            .unwrap_or_default();

        rows.push(StoredRow {
            id: id.value(i).to_string(),
            language: language.value(i).to_string(),
            pure_text: pure_text.value(i).to_string(),
            element: element.value(i).to_string(),
            file_id: file_id.value(i).to_string(),
            original: original.value(i).to_string(),
            unit_id: unit_id.value(i).to_string(),
            segment_index: segment_index.value(i),
            segment_count: segment_count.value(i),
            vector,
            state: opt(&state, i),
            sub_state: opt(&sub_state, i),
            quality: quality.as_ref().filter(|q| q.is_valid(i)).map(|q| q.value(i)),
            creation_date: opt(&creation_date, i),
            creation_id: opt(&creation_id, i),
            change_date: opt(&change_date, i),
            change_id: opt(&change_id, i),
            creation_tool: opt(&creation_tool, i),
            creation_tool_version: opt(&creation_tool_version, i),
            context: opt(&context, i),
            last_usage_date: opt(&last_usage_date, i),
            usage_count: usage_count.as_ref().filter(|u| u.is_valid(i)).map(|u| u.value(i)),
            notes_json: opt(&notes_json, i),
            properties_json: opt(&properties_json, i),
            segment_json: opt(&segment_json, i),
        });
    }
    Ok(rows)
}
