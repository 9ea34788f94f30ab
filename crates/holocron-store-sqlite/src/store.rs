//! [`SqliteStore`], the SQLite implementation of [`SyncStore`].

use std::{collections::{BTreeSet, HashMap}, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, types::ValueRef};
use sha2::{Digest as _, Sha256};

use holocron_core::{
  CharacterId,
  record::{
    ArtifactRows, Character, CharacterRecord, GlobalConstant, IndexRow,
    InventoryScan, InventorySummary, ItemPriceSnapshot, ItemSearchHit,
    ItemStack, JobRecord, MAX_LEVEL_DEFAULT, PriceScanRow, ProfessionRecord,
    RecipeReference, UNKNOWN_CLASS, item_handle,
  },
  store::{ItemQuery, SEARCH_LIMIT, SyncStore},
};

use crate::{
  Error, Result,
  encode::{
    RawCharacter, RawItem, RawRecipe, decode_container, decode_dt, decode_u32,
    encode_dt, encode_materials,
  },
  schema::{SCHEMA, TABLES, sync_columns},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Holocron store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open from a `DATABASE_URL`: `sqlite://<path>`, `sqlite:<path>`,
  /// `sqlite::memory:`, or a bare path.
  pub async fn connect(url: &str) -> Result<Self> {
    match database_path(url)? {
      None => Self::open_in_memory().await,
      Some(path) => Self::open(path).await,
    }
  }

  async fn init_schema(&self) -> Result<()> {
    let added = self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(sync_columns(conn)?)
      })
      .await?;
    for column in added {
      tracing::info!(%column, "added missing column");
    }
    Ok(())
  }
}

/// The filesystem path named by a database url; `None` for in-memory.
pub fn database_path(url: &str) -> Result<Option<String>> {
  let url = url.trim();
  let rest = url
    .strip_prefix("sqlite://")
    .or_else(|| url.strip_prefix("sqlite:"));
  let path = match rest {
    Some(rest) => rest,
    None if url.contains("://") => return Err(Error::UnsupportedUrl(url.to_owned())),
    None => url,
  };
  if path.is_empty() {
    return Err(Error::UnsupportedUrl(url.to_owned()));
  }
  Ok((path != ":memory:").then(|| path.to_owned()))
}

/// Make sure the character row exists so foreign keys hold for rows that
/// arrive before (or without) a full character record.
fn ensure_character(
  conn: &rusqlite::Connection,
  id: &str,
  name: &str,
  realm: &str,
  at: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO characters (
       character_id, name, realm, class, level, first_seen, last_seen
     ) VALUES (?1, ?2, ?3, ?5, ?6, ?4, ?4)
     ON CONFLICT(character_id) DO NOTHING",
    rusqlite::params![id, name, realm, at, UNKNOWN_CLASS, MAX_LEVEL_DEFAULT],
  )?;
  Ok(())
}

fn hash_value(hasher: &mut Sha256, value: ValueRef<'_>) {
  match value {
    ValueRef::Null => hasher.update(b"N"),
    ValueRef::Integer(i) => {
      hasher.update(b"I");
      hasher.update(i.to_le_bytes());
    }
    ValueRef::Real(f) => {
      hasher.update(b"R");
      hasher.update(f.to_le_bytes());
    }
    ValueRef::Text(t) | ValueRef::Blob(t) => {
      hasher.update(b"T");
      hasher.update((t.len() as u64).to_le_bytes());
      hasher.update(t);
    }
  }
}

// ─── SyncStore impl ──────────────────────────────────────────────────────────

impl SyncStore for SqliteStore {
  type Error = Error;

  fn is_transient(error: &Error) -> bool { error.is_transient() }

  // ── Characters & inventory ────────────────────────────────────────────────

  async fn upsert_character(&self, record: CharacterRecord) -> Result<CharacterId> {
    let id_str    = record.id.to_string();
    let name      = record.id.name().to_owned();
    let realm     = record.id.realm().to_owned();
    let level     = record.level.map(i64::from);
    let seen_str  = encode_dt(record.seen_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO characters (
             character_id, name, realm, class, level, race, faction, spec,
             item_level, first_seen, last_seen
           ) VALUES (?1, ?2, ?3, COALESCE(?4, ?11), COALESCE(?5, ?12),
                     ?6, ?7, ?8, ?9, ?10, ?10)
           ON CONFLICT(character_id) DO UPDATE SET
             class      = COALESCE(?4, class),
             level      = COALESCE(?5, level),
             race       = COALESCE(excluded.race, race),
             faction    = COALESCE(excluded.faction, faction),
             spec       = COALESCE(excluded.spec, spec),
             item_level = COALESCE(excluded.item_level, item_level),
             first_seen = MIN(first_seen, excluded.first_seen),
             last_seen  = MAX(last_seen, excluded.last_seen)",
          rusqlite::params![
            id_str,
            name,
            realm,
            record.class,
            level,
            record.race,
            record.faction,
            record.spec,
            record.item_level,
            seen_str,
            UNKNOWN_CLASS,
            MAX_LEVEL_DEFAULT,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(record.id)
  }

  async fn get_character(&self, id: CharacterId) -> Result<Option<Character>> {
    let id_str = id.to_string();

    let raw: Option<RawCharacter> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT character_id, name, realm, class, level, race, faction, spec,
                    item_level, first_seen, last_seen
             FROM characters WHERE character_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawCharacter {
                character_id: row.get(0)?,
                name:         row.get(1)?,
                realm:        row.get(2)?,
                class:        row.get(3)?,
                level:        row.get(4)?,
                race:         row.get(5)?,
                faction:      row.get(6)?,
                spec:         row.get(7)?,
                item_level:   row.get(8)?,
                first_seen:   row.get(9)?,
                last_seen:    row.get(10)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawCharacter::into_character).transpose()
  }

  async fn replace_inventory(
    &self,
    character: CharacterId,
    scan: InventoryScan,
  ) -> Result<InventorySummary> {
    let id_str   = character.to_string();
    let name     = character.name().to_owned();
    let realm    = character.realm().to_owned();
    let at_str   = encode_dt(scan.scanned_at);

    let surface: BTreeSet<&'static str> = scan
      .surface
      .iter()
      .chain(scan.stacks.iter().map(|s| &s.location.container_type))
      .map(|t| t.as_str())
      .collect();
    let stacks: Vec<(String, &'static str, u32, u32, u32, Option<String>)> = scan
      .stacks
      .into_iter()
      .filter(|s| s.count > 0)
      .map(|s| {
        (
          item_handle(&character, s.item_id, s.location),
          s.location.container_type.as_str(),
          s.location.container_index,
          s.item_id,
          s.count,
          s.name,
        )
      })
      .collect();

    let summary = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        ensure_character(&tx, &id_str, &name, &realm, &at_str)?;

        let mut removed = 0;
        for container_type in &surface {
          removed += tx.execute(
            "DELETE FROM items WHERE character_id = ?1 AND container_type = ?2",
            rusqlite::params![id_str, container_type],
          )?;
        }

        let mut inserted = 0;
        for (handle, container_type, index, item_id, count, item_name) in &stacks {
          tx.execute(
            "INSERT OR IGNORE INTO storage_locations
               (character_id, container_type, container_index)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![id_str, container_type, index],
          )?;
          tx.execute(
            "INSERT INTO items (
               item_handle, character_id, container_type, container_index,
               item_id, count, name, last_updated
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(item_handle) DO UPDATE SET
               count = count + excluded.count,
               name  = COALESCE(excluded.name, name)",
            rusqlite::params![
              handle, id_str, container_type, index, item_id, count, item_name,
              at_str,
            ],
          )?;
          inserted += 1;
        }

        tx.commit()?;
        Ok(InventorySummary { removed, inserted })
      })
      .await?;

    tracing::debug!(
      character = %character,
      removed = summary.removed,
      inserted = summary.inserted,
      "replaced inventory"
    );
    Ok(summary)
  }

  async fn inventory(&self, character: CharacterId) -> Result<Vec<ItemStack>> {
    let id_str = character.to_string();

    let raws: Vec<RawItem> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT item_handle, character_id, container_type, container_index,
                  item_id, count, name, last_updated
           FROM items WHERE character_id = ?1
           ORDER BY container_type, container_index, item_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawItem {
              item_handle:     row.get(0)?,
              character_id:    row.get(1)?,
              container_type:  row.get(2)?,
              container_index: row.get(3)?,
              item_id:         row.get(4)?,
              count:           row.get(5)?,
              name:            row.get(6)?,
              last_updated:    row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawItem::into_stack).collect()
  }

  // ── Professions & recipes ─────────────────────────────────────────────────

  async fn upsert_profession(&self, record: ProfessionRecord) -> Result<Option<u32>> {
    let id_str = record.character.to_string();
    let name   = record.character.name().to_owned();
    let realm  = record.character.realm().to_owned();
    let at_str = encode_dt(record.updated_at);

    let previous: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        ensure_character(&tx, &id_str, &name, &realm, &at_str)?;
        let previous: Option<i64> = tx
          .query_row(
            "SELECT skill FROM professions
             WHERE character_id = ?1 AND profession_id = ?2",
            rusqlite::params![id_str, record.profession_id],
            |r| r.get(0),
          )
          .optional()?;
        tx.execute(
          "INSERT INTO professions (
             character_id, profession_id, name, skill, max_skill, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT(character_id, profession_id) DO UPDATE SET
             name       = excluded.name,
             skill      = excluded.skill,
             max_skill  = excluded.max_skill,
             updated_at = MAX(updated_at, excluded.updated_at)",
          rusqlite::params![
            id_str,
            record.profession_id,
            record.name,
            record.skill,
            record.max_skill,
            at_str,
          ],
        )?;
        tx.commit()?;
        Ok(previous)
      })
      .await?;

    previous.map(|s| decode_u32("skill", s)).transpose()
  }

  async fn professions(&self, character: CharacterId) -> Result<Vec<ProfessionRecord>> {
    let id_str = character.to_string();

    let raws: Vec<(i64, String, i64, i64, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT profession_id, name, skill, max_skill, updated_at
           FROM professions WHERE character_id = ?1 ORDER BY profession_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(profession_id, name, skill, max_skill, updated_at)| {
        Ok(ProfessionRecord {
          character: character.clone(),
          profession_id: decode_u32("profession_id", profession_id)?,
          name,
          skill: decode_u32("skill", skill)?,
          max_skill: decode_u32("max_skill", max_skill)?,
          updated_at: decode_dt(&updated_at)?,
        })
      })
      .collect()
  }

  async fn upsert_recipe(&self, record: RecipeReference) -> Result<()> {
    let materials = record.materials.as_deref().map(encode_materials).transpose()?;
    let at_str    = encode_dt(record.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO recipe_reference (
             recipe_id, name, profession, skill_tier, materials,
             crafted_item_id, crafted_quantity, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT(recipe_id) DO UPDATE SET
             name             = COALESCE(name, excluded.name),
             profession       = COALESCE(excluded.profession, profession),
             skill_tier       = COALESCE(excluded.skill_tier, skill_tier),
             materials        = COALESCE(excluded.materials, materials),
             crafted_item_id  = COALESCE(excluded.crafted_item_id, crafted_item_id),
             crafted_quantity = COALESCE(excluded.crafted_quantity, crafted_quantity),
             updated_at       = MAX(updated_at, excluded.updated_at)",
          rusqlite::params![
            record.recipe_id,
            record.name,
            record.profession,
            record.skill_tier,
            materials,
            record.crafted_item_id,
            record.crafted_quantity,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_recipe(&self, recipe_id: u32) -> Result<Option<RecipeReference>> {
    let raw: Option<RawRecipe> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {} FROM recipe_reference WHERE recipe_id = ?1",
              RawRecipe::COLUMNS
            ),
            rusqlite::params![recipe_id],
            RawRecipe::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawRecipe::into_recipe).transpose()
  }

  async fn recipes_missing_materials(&self, limit: usize) -> Result<Vec<RecipeReference>> {
    let limit_val = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawRecipe> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM recipe_reference
           WHERE materials IS NULL ORDER BY recipe_id LIMIT ?1",
          RawRecipe::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], RawRecipe::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecipe::into_recipe).collect()
  }

  // ── Market & constants ────────────────────────────────────────────────────

  async fn append_scan_batch(&self, rows: Vec<PriceScanRow>) -> Result<usize> {
    // Ordinal of each listing among same-keyed listings in this batch.
    let mut seen: HashMap<(String, DateTime<Utc>, u32), i64> = HashMap::new();
    let encoded: Vec<(String, String, u32, i64, i64, u32)> = rows
      .into_iter()
      .map(|row| {
        let seq = seen
          .entry((row.source.clone(), row.timestamp, row.item_id))
          .or_insert(0);
        let this = *seq;
        *seq += 1;
        let price = i64::try_from(row.price).unwrap_or(i64::MAX);
        (row.source, encode_dt(row.timestamp), row.item_id, this, price, row.quantity)
      })
      .collect();

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO price_history
               (source, timestamp, item_id, seq, price, quantity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          )?;
          for (source, ts, item_id, seq, price, quantity) in &encoded {
            written += stmt.execute(rusqlite::params![
              source, ts, item_id, seq, price, quantity
            ])?;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;
    Ok(written)
  }

  async fn upsert_price_snapshots(&self, snapshots: Vec<ItemPriceSnapshot>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO item_price_snapshot
               (item_id, min_price, total_quantity, scanned_at, source)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(item_id) DO UPDATE SET
               min_price      = excluded.min_price,
               total_quantity = excluded.total_quantity,
               scanned_at     = excluded.scanned_at,
               source         = excluded.source",
          )?;
          for s in &snapshots {
            stmt.execute(rusqlite::params![
              s.item_id,
              i64::try_from(s.min_price).unwrap_or(i64::MAX),
              i64::try_from(s.total_quantity).unwrap_or(i64::MAX),
              encode_dt(s.scanned_at),
              s.source,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn set_constant(
    &self,
    key: String,
    value: serde_json::Value,
    at: DateTime<Utc>,
  ) -> Result<()> {
    let value_str = serde_json::to_string(&value)?;
    let at_str    = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO global_constants (key, value, updated_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(key) DO UPDATE SET
             value = excluded.value, updated_at = excluded.updated_at",
          rusqlite::params![key, value_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_constant(&self, key: String) -> Result<Option<GlobalConstant>> {
    let raw: Option<(String, String, String)> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT key, value, updated_at FROM global_constants WHERE key = ?1",
            rusqlite::params![key],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
          )
          .optional()?)
      })
      .await?;

    raw
      .map(|(key, value, updated_at)| {
        Ok(GlobalConstant {
          key,
          value: serde_json::from_str(&value)?,
          updated_at: decode_dt(&updated_at)?,
        })
      })
      .transpose()
  }

  // ── Jobs ──────────────────────────────────────────────────────────────────

  async fn upsert_job(&self, job: JobRecord) -> Result<()> {
    let id_str = job.character.to_string();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO logistics_jobs (character_id, item_id, count, target)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(character_id, item_id, target) DO UPDATE SET
             count = excluded.count",
          rusqlite::params![id_str, job.item_id, job.count, job.target],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn search_items<'a>(&'a self, query: &'a ItemQuery) -> Result<Vec<ItemSearchHit>> {
    let query     = query.clone();
    let limit_val = SEARCH_LIMIT as i64;

    let raws: Vec<(String, i64, i64, String, i64, String)> = self
      .conn
      .call(move |conn| {
        const SELECT: &str = "SELECT COALESCE(name, 'Item #' || item_id), item_id,
                                     count, container_type, container_index,
                                     character_id
                              FROM items";
        const ORDER: &str = "ORDER BY 1, character_id, container_type, container_index";
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<_> {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
          ))
        };
        let rows = match &query {
          ItemQuery::Id(id) => {
            let mut stmt =
              conn.prepare(&format!("{SELECT} WHERE item_id = ?1 {ORDER} LIMIT ?2"))?;
            stmt
              .query_map(rusqlite::params![id, limit_val], map_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?
          }
          ItemQuery::Name(name) => {
            let escaped = name
              .replace('\\', "\\\\")
              .replace('%', "\\%")
              .replace('_', "\\_");
            let pattern = format!("%{escaped}%");
            let mut stmt = conn.prepare(&format!(
              "{SELECT} WHERE name LIKE ?1 ESCAPE '\\' {ORDER} LIMIT ?2"
            ))?;
            stmt
              .query_map(rusqlite::params![pattern, limit_val], map_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?
          }
        };
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(name, item_id, count, container_type, index, character_id)| {
        Ok(ItemSearchHit {
          name,
          item_id: decode_u32("item_id", item_id)?,
          count: decode_u32("count", count)?,
          container_type: decode_container(&container_type)?,
          container_index: decode_u32("container_index", index)?,
          character: CharacterId::parse(&character_id)?,
        })
      })
      .collect()
  }

  async fn artifact_rows(&self) -> Result<ArtifactRows> {
    type RawIndex = (i64, Option<String>, String, i64);
    type RawJob = (String, i64, i64, String);

    let (index, jobs): (Vec<RawIndex>, Vec<RawJob>) = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        let index = {
          let mut stmt = tx.prepare(
            "SELECT item_id, MAX(name), container_type, SUM(count)
             FROM items
             GROUP BY item_id, container_type
             ORDER BY item_id, container_type",
          )?;
          stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        let jobs = {
          let mut stmt = tx.prepare(
            "SELECT character_id, item_id, count, target
             FROM logistics_jobs
             WHERE count > 0
             ORDER BY character_id, item_id, target",
          )?;
          stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.commit()?;
        Ok((index, jobs))
      })
      .await?;

    let index = index
      .into_iter()
      .map(|(item_id, name, container_type, count)| {
        Ok(IndexRow {
          item_id: decode_u32("item_id", item_id)?,
          name,
          container_type: decode_container(&container_type)?,
          count: u64::try_from(count)
            .map_err(|_| Error::NegativeCount { column: "count", value: count })?,
        })
      })
      .collect::<Result<_>>()?;
    let jobs = jobs
      .into_iter()
      .map(|(character, item_id, count, target)| {
        Ok(JobRecord {
          character: CharacterId::parse(&character)?,
          item_id: decode_u32("item_id", item_id)?,
          count: decode_u32("count", count)?,
          target,
        })
      })
      .collect::<Result<_>>()?;

    Ok(ArtifactRows { index, jobs })
  }

  async fn state_digest(&self) -> Result<String> {
    let digest = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        let mut hasher = Sha256::new();
        for (table, order) in TABLES {
          hasher.update(table.as_bytes());
          let mut stmt = tx.prepare(&format!("SELECT * FROM {table} ORDER BY {order}"))?;
          let columns = stmt.column_count();
          let mut rows = stmt.query([])?;
          while let Some(row) = rows.next()? {
            for i in 0..columns {
              hash_value(&mut hasher, row.get_ref(i)?);
            }
            hasher.update(b"\n");
          }
        }
        drop(tx);
        Ok(hasher.finalize())
      })
      .await?;
    Ok(hex::encode(digest))
  }
}
