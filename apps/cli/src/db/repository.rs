//! SQLite implementation of the collection repositories.

use std::path::Path;

use chrono::{DateTime, Utc};
use notecard_core::store::{CardRepository, DeckRepository, NoteRepository, NoteTypeRepository};
use notecard_core::{
    Card, CardId, CardStatus, Deck, DeckId, Note, NoteId, NoteType, Rating, ReconcilePlan,
    ReviewLogEntry, Store, StoreError,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::error::DbError;
use super::schema::{INIT_METADATA, SCHEMA, SCHEMA_VERSION};

type Result<T> = std::result::Result<T, DbError>;
type StoreResult<T> = std::result::Result<T, StoreError>;

/// SQLite-backed repository.
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Open database at path, creating if necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    /// Open in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.conn.execute_batch(INIT_METADATA)?;

        let version = self.schema_version()?;
        if version > SCHEMA_VERSION {
            return Err(DbError::InvalidData(format!(
                "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
            )));
        }
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i32> {
        let version = self.conn.query_row(
            "SELECT CAST(value AS INTEGER) FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::InvalidData(format!("bad timestamp '{value}': {e}")))
}

fn parse_status(value: &str) -> Result<CardStatus> {
    match value {
        "new" => Ok(CardStatus::New),
        "learning" => Ok(CardStatus::Learning),
        "review" => Ok(CardStatus::Review),
        "relearning" => Ok(CardStatus::Relearning),
        other => Err(DbError::InvalidData(format!("unknown card status '{other}'"))),
    }
}

/// Raw `notes` row before JSON columns are decoded.
struct NoteRow {
    id: NoteId,
    type_name: String,
    field_map: String,
    tags: String,
    created_at: String,
    modified_at: String,
    usn: i64,
}

const NOTE_COLUMNS: &str = "id, type_name, field_map, tags, created_at, modified_at, usn";

impl NoteRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            type_name: row.get(1)?,
            field_map: row.get(2)?,
            tags: row.get(3)?,
            created_at: row.get(4)?,
            modified_at: row.get(5)?,
            usn: row.get(6)?,
        })
    }

    fn decode(self) -> Result<Note> {
        let field_map = serde_json::from_str(&self.field_map).map_err(|e| {
            DbError::InvalidData(format!("note {}: field data does not decode: {e}", self.id))
        })?;
        Ok(Note {
            id: self.id,
            type_name: self.type_name,
            field_map,
            tags: serde_json::from_str(&self.tags)?,
            created_at: parse_time(&self.created_at)?,
            modified_at: parse_time(&self.modified_at)?,
            usn: self.usn,
        })
    }
}

/// Raw `cards` row before the scheduling column is decoded.
struct CardRow {
    id: CardId,
    note_id: NoteId,
    deck_id: DeckId,
    template_name: String,
    ordinal: u32,
    front: String,
    back: String,
    scheduling: String,
    flag: u8,
    marked: bool,
    suspended: bool,
    usn: i64,
}

const CARD_COLUMNS: &str =
    "id, note_id, deck_id, template_name, ordinal, front, back, scheduling, flag, marked, suspended, usn";

impl CardRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            note_id: row.get(1)?,
            deck_id: row.get(2)?,
            template_name: row.get(3)?,
            ordinal: row.get(4)?,
            front: row.get(5)?,
            back: row.get(6)?,
            scheduling: row.get(7)?,
            flag: row.get(8)?,
            marked: row.get(9)?,
            suspended: row.get(10)?,
            usn: row.get(11)?,
        })
    }

    fn decode(self) -> Result<Card> {
        Ok(Card {
            id: self.id,
            note_id: self.note_id,
            deck_id: self.deck_id,
            template_name: self.template_name,
            ordinal: self.ordinal,
            front: self.front,
            back: self.back,
            scheduling: serde_json::from_str(&self.scheduling)?,
            flag: self.flag,
            marked: self.marked,
            suspended: self.suspended,
            usn: self.usn,
        })
    }
}

fn due_millis(card: &Card) -> Option<i64> {
    card.scheduling.due_date.map(|due| due.timestamp_millis())
}

fn insert_card(conn: &Connection, card: &Card) -> Result<()> {
    conn.execute(
        "INSERT INTO cards (id, note_id, deck_id, template_name, ordinal, front, back, scheduling, flag, marked, suspended, usn, due) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            card.id,
            card.note_id,
            card.deck_id,
            card.template_name,
            card.ordinal,
            card.front,
            card.back,
            serde_json::to_string(&card.scheduling)?,
            card.flag,
            card.marked,
            card.suspended,
            card.usn,
            due_millis(card)
        ],
    )?;
    Ok(())
}

fn update_card_row(conn: &Connection, card: &Card) -> Result<()> {
    let changed = conn.execute(
        "UPDATE cards SET deck_id = ?2, front = ?3, back = ?4, scheduling = ?5, flag = ?6, marked = ?7, suspended = ?8, usn = ?9, due = ?10 WHERE id = ?1",
        params![
            card.id,
            card.deck_id,
            card.front,
            card.back,
            serde_json::to_string(&card.scheduling)?,
            card.flag,
            card.marked,
            card.suspended,
            card.usn,
            due_millis(card)
        ],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound { entity: "card", id: card.id });
    }
    Ok(())
}

fn delete_card_row(conn: &Connection, id: CardId) -> Result<()> {
    conn.execute("DELETE FROM revlog WHERE card_id = ?1", params![id])?;
    let deleted = conn.execute("DELETE FROM cards WHERE id = ?1", params![id])?;
    if deleted == 0 {
        return Err(DbError::NotFound { entity: "card", id });
    }
    Ok(())
}

fn write_note_row(conn: &Connection, verb: &str, note: &Note) -> Result<()> {
    conn.execute(
        &format!("{verb} INTO notes ({NOTE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        params![
            note.id,
            note.type_name,
            serde_json::to_string(&note.field_map)?,
            serde_json::to_string(&note.tags)?,
            note.created_at.to_rfc3339(),
            note.modified_at.to_rfc3339(),
            note.usn
        ],
    )?;
    Ok(())
}

fn update_note_row(conn: &Connection, note: &Note) -> Result<()> {
    let changed = conn.execute(
        "UPDATE notes SET type_name = ?2, field_map = ?3, tags = ?4, modified_at = ?5, usn = ?6 WHERE id = ?1",
        params![
            note.id,
            note.type_name,
            serde_json::to_string(&note.field_map)?,
            serde_json::to_string(&note.tags)?,
            note.modified_at.to_rfc3339(),
            note.usn
        ],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound { entity: "note", id: note.id });
    }
    Ok(())
}

fn write_note_type_row(conn: &Connection, note_type: &NoteType) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO note_types (name, fields, templates, sort_field_index, field_options) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            note_type.name,
            serde_json::to_string(&note_type.fields)?,
            serde_json::to_string(&note_type.templates)?,
            note_type.sort_field_index as i64,
            serde_json::to_string(&note_type.field_options)?
        ],
    )?;
    Ok(())
}

fn write_plan(conn: &Connection, plan: &ReconcilePlan) -> Result<()> {
    for card in &plan.to_create {
        insert_card(conn, card)?;
    }
    for card in &plan.to_update {
        update_card_row(conn, card)?;
    }
    for id in &plan.to_delete {
        delete_card_row(conn, *id)?;
    }
    if !plan.is_noop() {
        raise_usn(conn, plan.usn)?;
    }
    Ok(())
}

fn raise_usn(conn: &Connection, usn: i64) -> Result<()> {
    conn.execute(
        "UPDATE metadata SET value = ?1 WHERE key = 'usn' AND CAST(value AS INTEGER) < ?1",
        params![usn],
    )?;
    Ok(())
}

impl NoteTypeRepository for SqliteRepository {
    fn get_note_type(&self, name: &str) -> StoreResult<Option<NoteType>> {
        let row = self
            .conn
            .query_row(
                "SELECT name, fields, templates, sort_field_index, field_options FROM note_types WHERE name = ?1",
                params![name],
                note_type_row,
            )
            .optional()
            .map_err(DbError::from)?;
        Ok(row.map(decode_note_type).transpose()?)
    }

    fn list_note_types(&self) -> StoreResult<Vec<NoteType>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, fields, templates, sort_field_index, field_options FROM note_types ORDER BY name")
            .map_err(DbError::from)?;
        let rows = stmt
            .query_map([], note_type_row)
            .map_err(DbError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(decode_note_type)
            .collect::<Result<Vec<_>>>()?)
    }

    fn save_note_type(&mut self, note_type: &NoteType) -> StoreResult<()> {
        Ok(write_note_type_row(&self.conn, note_type)?)
    }
}

type NoteTypeRow = (String, String, String, i64, String);

fn note_type_row(row: &Row) -> rusqlite::Result<NoteTypeRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_note_type((name, fields, templates, sort_field_index, field_options): NoteTypeRow) -> Result<NoteType> {
    Ok(NoteType {
        name,
        fields: serde_json::from_str(&fields)?,
        templates: serde_json::from_str(&templates)?,
        sort_field_index: usize::try_from(sort_field_index)
            .map_err(|_| DbError::InvalidData(format!("negative sort field index {sort_field_index}")))?,
        field_options: serde_json::from_str(&field_options)?,
    })
}

impl NoteRepository for SqliteRepository {
    fn get_note(&self, id: NoteId) -> StoreResult<Option<Note>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
                params![id],
                NoteRow::from_row,
            )
            .optional()
            .map_err(DbError::from)?;
        Ok(row.map(NoteRow::decode).transpose()?)
    }

    fn get_notes_by_type(&self, type_name: &str) -> StoreResult<Vec<StoreResult<Note>>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {NOTE_COLUMNS} FROM notes WHERE type_name = ?1 ORDER BY id"))
            .map_err(DbError::from)?;
        let rows = stmt
            .query_map(params![type_name], NoteRow::from_row)
            .map_err(DbError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|row| row.decode().map_err(StoreError::from))
            .collect())
    }

    fn create_note(&mut self, note: &Note) -> StoreResult<()> {
        Ok(write_note_row(&self.conn, "INSERT", note)?)
    }

    fn update_note(&mut self, note: &Note) -> StoreResult<()> {
        Ok(update_note_row(&self.conn, note)?)
    }

    fn next_note_id(&self) -> StoreResult<NoteId> {
        let id = self
            .conn
            .query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM notes", [], |row| row.get(0))
            .map_err(DbError::from)?;
        Ok(id)
    }
}

impl SqliteRepository {
    fn query_cards(&self, sql: &str, params: impl rusqlite::Params) -> StoreResult<Vec<Card>> {
        let mut stmt = self.conn.prepare(sql).map_err(DbError::from)?;
        let rows = stmt
            .query_map(params, CardRow::from_row)
            .map_err(DbError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(CardRow::decode)
            .collect::<Result<Vec<_>>>()?)
    }
}

impl CardRepository for SqliteRepository {
    fn get_card(&self, id: CardId) -> StoreResult<Option<Card>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"),
                params![id],
                CardRow::from_row,
            )
            .optional()
            .map_err(DbError::from)?;
        Ok(row.map(CardRow::decode).transpose()?)
    }

    fn get_cards_by_note(&self, note_id: NoteId) -> StoreResult<Vec<Card>> {
        self.query_cards(
            &format!("SELECT {CARD_COLUMNS} FROM cards WHERE note_id = ?1 ORDER BY id"),
            params![note_id],
        )
    }

    fn get_cards_by_deck(&self, deck_id: Option<DeckId>) -> StoreResult<Vec<Card>> {
        match deck_id {
            Some(id) => self.query_cards(
                &format!("SELECT {CARD_COLUMNS} FROM cards WHERE deck_id = ?1 ORDER BY id"),
                params![id],
            ),
            None => self.query_cards(&format!("SELECT {CARD_COLUMNS} FROM cards ORDER BY id"), []),
        }
    }

    fn get_due_cards(&self, deck_id: Option<DeckId>, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Card>> {
        let now = now.timestamp_millis();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        match deck_id {
            Some(id) => self.query_cards(
                &format!(
                    "SELECT {CARD_COLUMNS} FROM cards
                    WHERE deck_id = ?1 AND suspended = 0 AND due IS NOT NULL AND due <= ?2
                    ORDER BY due, id
                    LIMIT ?3"
                ),
                params![id, now, limit],
            ),
            None => self.query_cards(
                &format!(
                    "SELECT {CARD_COLUMNS} FROM cards
                    WHERE suspended = 0 AND due IS NOT NULL AND due <= ?1
                    ORDER BY due, id
                    LIMIT ?2"
                ),
                params![now, limit],
            ),
        }
    }

    fn create_card(&mut self, card: &Card) -> StoreResult<()> {
        Ok(insert_card(&self.conn, card)?)
    }

    fn update_card(&mut self, card: &Card) -> StoreResult<()> {
        Ok(update_card_row(&self.conn, card)?)
    }

    fn delete_card(&mut self, id: CardId) -> StoreResult<()> {
        Ok(delete_card_row(&self.conn, id)?)
    }

    fn next_card_id(&self) -> StoreResult<CardId> {
        let id = self
            .conn
            .query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM cards", [], |row| row.get(0))
            .map_err(DbError::from)?;
        Ok(id)
    }

    fn add_review(&mut self, card_id: CardId, entry: &ReviewLogEntry) -> StoreResult<()> {
        self.conn
            .execute(
                "INSERT INTO revlog (card_id, rating, reviewed_at, status_before, interval_before, interval_after, ease_before, ease_after, time_taken_ms) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    card_id,
                    entry.rating.to_value(),
                    entry.reviewed_at.to_rfc3339(),
                    entry.status_before.as_str(),
                    entry.interval_before,
                    entry.interval_after,
                    entry.ease_before,
                    entry.ease_after,
                    entry.time_taken_ms
                ],
            )
            .map_err(DbError::from)?;
        Ok(())
    }

    fn get_reviews(&self, card_id: CardId) -> StoreResult<Vec<ReviewLogEntry>> {
        type RevlogRow = (u8, String, String, f64, f64, f64, f64, Option<u32>);

        let mut stmt = self
            .conn
            .prepare(
                "SELECT rating, reviewed_at, status_before, interval_before, interval_after, ease_before, ease_after, time_taken_ms FROM revlog WHERE card_id = ?1 ORDER BY id",
            )
            .map_err(DbError::from)?;
        let rows: Vec<RevlogRow> = stmt
            .query_map(params![card_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })
            .map_err(DbError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(DbError::from)?;

        let decode = |(rating, reviewed_at, status, ib, ia, eb, ea, ms): RevlogRow| -> Result<ReviewLogEntry> {
            Ok(ReviewLogEntry {
                rating: Rating::from_value(rating)
                    .ok_or_else(|| DbError::InvalidData(format!("rating out of range: {rating}")))?,
                reviewed_at: parse_time(&reviewed_at)?,
                status_before: parse_status(&status)?,
                interval_before: ib,
                interval_after: ia,
                ease_before: eb,
                ease_after: ea,
                time_taken_ms: ms,
            })
        };
        Ok(rows.into_iter().map(decode).collect::<Result<Vec<_>>>()?)
    }
}

impl DeckRepository for SqliteRepository {
    fn get_deck(&self, id: DeckId) -> StoreResult<Option<Deck>> {
        let deck = self
            .conn
            .query_row("SELECT id, name FROM decks WHERE id = ?1", params![id], |row| {
                Ok(Deck {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .optional()
            .map_err(DbError::from)?;
        Ok(deck)
    }

    fn deck_id_by_name(&self, name: &str) -> StoreResult<Option<DeckId>> {
        let id = self
            .conn
            .query_row("SELECT id FROM decks WHERE name = ?1", params![name], |row| row.get(0))
            .optional()
            .map_err(DbError::from)?;
        Ok(id)
    }

    fn create_deck(&mut self, name: &str) -> StoreResult<Deck> {
        self.conn
            .execute("INSERT INTO decks (name) VALUES (?1)", params![name])
            .map_err(DbError::from)?;
        Ok(Deck {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    fn list_decks(&self) -> StoreResult<Vec<Deck>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM decks ORDER BY id")
            .map_err(DbError::from)?;
        let decks = stmt
            .query_map([], |row| {
                Ok(Deck {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(DbError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(DbError::from)?;
        Ok(decks)
    }
}

impl Store for SqliteRepository {
    fn current_usn(&self) -> StoreResult<i64> {
        let usn = self
            .conn
            .query_row(
                "SELECT CAST(value AS INTEGER) FROM metadata WHERE key = 'usn'",
                [],
                |row| row.get(0),
            )
            .map_err(DbError::from)?;
        Ok(usn)
    }

    fn record_usn(&mut self, usn: i64) -> StoreResult<()> {
        Ok(raise_usn(&self.conn, usn)?)
    }

    /// Applies the whole plan in one transaction.
    fn apply_plan(&mut self, plan: &ReconcilePlan) -> StoreResult<()> {
        let apply = |conn: &mut Connection| -> Result<()> {
            let tx = conn.transaction()?;
            write_plan(&tx, plan)?;
            tx.commit()?;
            Ok(())
        };
        Ok(apply(&mut self.conn)?)
    }

    /// Note row and card plan share one transaction.
    fn apply_note_plan(&mut self, note: &Note, plan: &ReconcilePlan) -> StoreResult<()> {
        let apply = |conn: &mut Connection| -> Result<()> {
            let tx = conn.transaction()?;
            write_note_row(&tx, "INSERT OR REPLACE", note)?;
            write_plan(&tx, plan)?;
            raise_usn(&tx, note.usn)?;
            tx.commit()?;
            Ok(())
        };
        Ok(apply(&mut self.conn)?)
    }

    fn save_note_type_with_notes(&mut self, note_type: &NoteType, notes: &[Note]) -> StoreResult<()> {
        let save = |conn: &mut Connection| -> Result<()> {
            let tx = conn.transaction()?;
            for note in notes {
                update_note_row(&tx, note)?;
                raise_usn(&tx, note.usn)?;
            }
            write_note_type_row(&tx, note_type)?;
            tx.commit()?;
            Ok(())
        };
        Ok(save(&mut self.conn)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notecard_core::{FieldMap, SchedulingState};

    fn note(id: NoteId) -> Note {
        Note {
            id,
            type_name: "Basic".to_string(),
            field_map: FieldMap::from([("Front".to_string(), "hi".to_string())]),
            tags: vec!["geo".to_string()],
            created_at: Utc::now(),
            modified_at: Utc::now(),
            usn: 1,
        }
    }

    fn card(id: CardId, note_id: NoteId, deck_id: DeckId, ordinal: u32) -> Card {
        Card {
            id,
            note_id,
            deck_id,
            template_name: "Cloze".to_string(),
            ordinal,
            front: "f".to_string(),
            back: "b".to_string(),
            scheduling: SchedulingState::default(),
            flag: 0,
            marked: false,
            suspended: false,
            usn: 1,
        }
    }

    #[test]
    fn schema_initializes_idempotently() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.initialize().unwrap();
        assert_eq!(repo.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(repo.current_usn().unwrap(), 0);
    }

    #[test]
    fn note_round_trip_and_id_allocation() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        assert_eq!(repo.next_note_id().unwrap(), 1);
        let n = note(4);
        repo.create_note(&n).unwrap();
        let loaded = repo.get_note(4).unwrap().unwrap();
        assert_eq!(loaded.field("Front"), "hi");
        assert_eq!(loaded.tags, vec!["geo"]);
        assert_eq!(repo.next_note_id().unwrap(), 5);
    }

    #[test]
    fn corrupt_note_surfaces_as_entry_error() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        repo.create_note(&note(1)).unwrap();
        repo.conn
            .execute(
                "INSERT INTO notes (id, type_name, field_map, tags, created_at, modified_at, usn) VALUES (2, 'Basic', 'not json', '[]', ?1, ?1, 0)",
                params![Utc::now().to_rfc3339()],
            )
            .unwrap();

        let notes = repo.get_notes_by_type("Basic").unwrap();
        assert_eq!(notes.len(), 2);
        assert!(notes[0].is_ok());
        assert!(matches!(notes[1], Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn apply_plan_rolls_back_on_failure() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let deck = repo.create_deck("Default").unwrap();
        repo.create_note(&note(1)).unwrap();

        let plan = ReconcilePlan {
            note_id: 1,
            usn: 5,
            to_create: vec![card(1, 1, deck.id, 1)],
            to_update: vec![card(99, 1, deck.id, 2)],
            ..Default::default()
        };
        assert!(repo.apply_plan(&plan).is_err());
        assert!(repo.get_cards_by_note(1).unwrap().is_empty());
        assert_eq!(repo.current_usn().unwrap(), 0);
    }

    #[test]
    fn apply_plan_writes_everything() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let deck = repo.create_deck("Default").unwrap();
        repo.create_note(&note(1)).unwrap();
        repo.create_card(&card(1, 1, deck.id, 1)).unwrap();
        repo.create_card(&card(2, 1, deck.id, 2)).unwrap();

        let mut changed = card(1, 1, deck.id, 1);
        changed.front = "new".to_string();
        let plan = ReconcilePlan {
            note_id: 1,
            usn: 3,
            to_create: vec![card(3, 1, deck.id, 3)],
            to_update: vec![changed],
            to_delete: vec![2],
            unchanged: vec![],
        };
        repo.apply_plan(&plan).unwrap();

        let cards = repo.get_cards_by_note(1).unwrap();
        assert_eq!(cards.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(cards[0].front, "new");
        assert_eq!(repo.current_usn().unwrap(), 3);
        assert_eq!(repo.next_card_id().unwrap(), 4);
    }

    #[test]
    fn failed_note_plan_leaves_no_note() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let deck = repo.create_deck("Default").unwrap();
        let plan = ReconcilePlan {
            note_id: 1,
            usn: 1,
            to_create: vec![card(1, 1, deck.id, 1)],
            to_update: vec![card(99, 1, deck.id, 2)],
            ..Default::default()
        };
        assert!(repo.apply_note_plan(&note(1), &plan).is_err());
        assert_eq!(repo.get_note(1).unwrap(), None);
        assert!(repo.get_cards_by_note(1).unwrap().is_empty());
        assert_eq!(repo.current_usn().unwrap(), 0);

        let plan = ReconcilePlan {
            note_id: 1,
            usn: 1,
            to_create: vec![card(1, 1, deck.id, 1)],
            ..Default::default()
        };
        repo.apply_note_plan(&note(1), &plan).unwrap();
        assert!(repo.get_note(1).unwrap().is_some());
        assert_eq!(repo.get_cards_by_note(1).unwrap().len(), 1);
        assert_eq!(repo.current_usn().unwrap(), 1);
    }

    #[test]
    fn note_type_and_rewritten_notes_commit_together() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let before = NoteType::new("Basic", &["Front", "Back"], vec![]);
        repo.save_note_type(&before).unwrap();
        repo.create_note(&note(1)).unwrap();

        let after = NoteType::new("Basic", &["Question", "Back"], vec![]);
        let mut renamed = note(1);
        renamed.field_map = FieldMap::from([("Question".to_string(), "hi".to_string())]);
        renamed.usn = 2;

        let err = repo.save_note_type_with_notes(&after, &[renamed.clone(), note(7)]);
        assert!(matches!(err, Err(StoreError::NotFound { .. })));
        assert_eq!(repo.get_note_type("Basic").unwrap(), Some(before));
        assert_eq!(repo.get_note(1).unwrap().unwrap().field("Front"), "hi");
        assert_eq!(repo.current_usn().unwrap(), 0);

        repo.save_note_type_with_notes(&after, &[renamed]).unwrap();
        assert_eq!(repo.get_note_type("Basic").unwrap(), Some(after));
        assert_eq!(repo.get_note(1).unwrap().unwrap().field("Question"), "hi");
        assert_eq!(repo.current_usn().unwrap(), 2);
    }

    #[test]
    fn due_cards_follow_due_column() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let deck = repo.create_deck("Default").unwrap();
        let other = repo.create_deck("Other").unwrap();
        repo.create_note(&note(1)).unwrap();
        let now = Utc::now();

        let due_in = |id, deck_id, ordinal, minutes: i64| {
            let mut c = card(id, 1, deck_id, ordinal);
            c.scheduling.due_date = Some(now + chrono::Duration::minutes(minutes));
            c
        };
        repo.create_card(&due_in(1, deck.id, 1, -5)).unwrap();
        repo.create_card(&due_in(2, deck.id, 2, -60)).unwrap();
        repo.create_card(&due_in(3, deck.id, 3, 60)).unwrap();
        repo.create_card(&due_in(4, other.id, 4, -30)).unwrap();
        repo.create_card(&card(5, 1, deck.id, 5)).unwrap();

        let ids = |cards: Vec<Card>| cards.iter().map(|c| c.id).collect::<Vec<_>>();
        assert_eq!(ids(repo.get_due_cards(Some(deck.id), now, 10).unwrap()), vec![2, 1]);
        assert_eq!(ids(repo.get_due_cards(None, now, 2).unwrap()), vec![2, 4]);

        let mut suspended = repo.get_card(2).unwrap().unwrap();
        suspended.suspended = true;
        repo.update_card(&suspended).unwrap();
        let mut pushed = repo.get_card(1).unwrap().unwrap();
        pushed.scheduling.due_date = Some(now + chrono::Duration::days(1));
        repo.update_card(&pushed).unwrap();
        assert!(repo.get_due_cards(Some(deck.id), now, 10).unwrap().is_empty());

        assert_eq!(repo.get_cards_by_deck(Some(deck.id)).unwrap().len(), 4);
        assert_eq!(repo.get_cards_by_deck(None).unwrap().len(), 5);
    }

    #[test]
    fn review_log_round_trip() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let deck = repo.create_deck("Default").unwrap();
        repo.create_note(&note(1)).unwrap();
        repo.create_card(&card(1, 1, deck.id, 1)).unwrap();
        let entry = ReviewLogEntry {
            rating: Rating::Hard,
            reviewed_at: Utc::now(),
            status_before: CardStatus::Review,
            interval_before: 3.0,
            interval_after: 3.6,
            ease_before: 2.5,
            ease_after: 2.35,
            time_taken_ms: Some(800),
        };
        repo.add_review(1, &entry).unwrap();
        let logs = repo.get_reviews(1).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].rating, Rating::Hard);
        assert_eq!(logs[0].status_before, CardStatus::Review);
        assert_eq!(logs[0].time_taken_ms, Some(800));
    }

    #[test]
    fn usn_only_moves_forward() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        repo.record_usn(5).unwrap();
        repo.record_usn(2).unwrap();
        assert_eq!(repo.current_usn().unwrap(), 5);
        assert_eq!(repo.next_usn().unwrap(), 6);
    }
}
