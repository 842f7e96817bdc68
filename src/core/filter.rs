//! Replay filter: the history rewriter.
//!
//! Both strategies are pure functions of `(events, anchors)`. They never
//! edit history in place; every surviving event is re-emitted as a new
//! object with adjusted sequence number, position, and predecessor link
//! where needed. A filter run either completes with a full replacement log
//! or fails with nothing installed.
//!
//! The two strategies share one pipeline: collect the matched pairs a range
//! cancels out (insert+delete of the same character, create+delete of the
//! same file or directory), then re-emit the survivors. They differ only in
//! how ranges are delimited and in what order survivors come back out.

use crate::core::document::Document;
use crate::core::error::{CodetraceError, Result};
use crate::core::events::{CharToken, Event, EventId, EventPayload};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

const ORIGIN: &str = "core:filter";

/// One annotation handle supplied by the comment collaborator. The handle
/// and text are opaque to the filter except for tag matching; the sequence
/// records where in the log the anchor currently sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentAnchor {
    /// Opaque annotation handle.
    pub id: Uuid,
    /// Comment text, used only to match collapse tags.
    pub text: String,
    /// Sequence number of the anchor event.
    pub sequence: u64,
}

/// Mapping from event id to the ordered annotations anchored on it.
#[derive(Debug, Clone, Default)]
pub struct CommentAnchors {
    by_event: BTreeMap<EventId, Vec<CommentAnchor>>,
}

impl CommentAnchors {
    /// Creates an empty anchor set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an anchor to an event, after any existing ones.
    pub fn attach(&mut self, event_id: EventId, anchor: CommentAnchor) {
        self.by_event.entry(event_id).or_default().push(anchor);
    }

    /// Whether any anchor is attached to the event.
    #[must_use]
    pub fn is_anchored(&self, event_id: EventId) -> bool {
        self.by_event.contains_key(&event_id)
    }

    /// Whether an anchor with exactly this text is attached to the event.
    #[must_use]
    pub fn has_tag(&self, event_id: EventId, tag: &str) -> bool {
        self.by_event
            .get(&event_id)
            .is_some_and(|anchors| anchors.iter().any(|a| a.text == tag))
    }

    /// Returns the anchors attached to an event.
    #[must_use]
    pub fn anchors_for(&self, event_id: EventId) -> Option<&Vec<CommentAnchor>> {
        self.by_event.get(&event_id)
    }

    /// Iterates over all anchored events.
    pub fn iter(&self) -> impl Iterator<Item = (&EventId, &Vec<CommentAnchor>)> {
        self.by_event.iter()
    }

    /// Total number of anchors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_event.values().map(Vec::len).sum()
    }

    /// Whether no anchors exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }
}

/// Which rewriting algorithm to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterStrategy {
    /// Anchored events close ranges; each range is re-emitted in canonical
    /// groups (file-system events, then cleanup deletes, then final
    /// inserts), reading as if written correctly in one pass.
    CollapseBetweenCheckpoints,
    /// Only ranges delimited by the given comment tags are touched, and
    /// survivors keep their original relative order.
    CollapseBetweenTags {
        start_tag: String,
        end_tag: String,
    },
}

/// The rewritten history: a replacement event list with dense sequence
/// numbers and the anchor set adjusted to match.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub events: Vec<Event>,
    pub anchors: CommentAnchors,
}

/// Runs a filter strategy over a snapshot of the log.
///
/// `reanchor` is called once for every anchor whose host event was dropped,
/// with the old and the new host event id; the returned anchor set already
/// reflects the move. The inputs are never mutated.
///
/// # Errors
/// Any error aborts the whole rewrite; the caller must not install a
/// partial result.
pub fn run_filter(
    events: &[Event],
    anchors: &CommentAnchors,
    strategy: &FilterStrategy,
    reanchor: impl FnMut(EventId, EventId),
) -> Result<FilterOutcome> {
    let output = match strategy {
        FilterStrategy::CollapseBetweenCheckpoints => collapse_checkpoints(events, anchors)?,
        FilterStrategy::CollapseBetweenTags { start_tag, end_tag } => {
            collapse_tags(events, anchors, start_tag, end_tag)?
        }
    };
    finalize(events, output, anchors, reanchor)
}

/// Per-file documents reconstructed while the filter walks a log.
#[derive(Debug, Default)]
struct DocSet {
    docs: HashMap<Uuid, Document>,
}

impl DocSet {
    fn doc(&mut self, file_id: Uuid) -> &mut Document {
        self.docs
            .entry(file_id)
            .or_insert_with(|| Document::new(file_id))
    }

    fn get(&self, file_id: Uuid) -> Option<&Document> {
        self.docs.get(&file_id)
    }

    fn apply_char(&mut self, event: &Event) -> Result<()> {
        self.doc(event.payload.subject_id()).apply(event)
    }
}

/// Matched pairs of one range: everything the range cancels out.
#[derive(Debug, Default)]
struct RangeDrops {
    dropped: HashSet<EventId>,
    /// Predecessor link of each dropped insert, for transitive resolution
    /// when a surviving insert pointed at a dropped character.
    dropped_insert_predecessor: HashMap<EventId, Option<EventId>>,
}

/// Collects the events a range cancels out.
///
/// A create+delete pair for the same file or directory drops both events
/// and every in-range event addressing that entity - it left no trace. An
/// in-range delete whose target insert is also in range drops both. With
/// `collapse_file_deletes` (checkpoint strategy only), a file deleted in
/// range additionally takes all of its in-range character events with it,
/// since none of them are visible once the file is gone.
fn collect_drops(range: &[&Event], collapse_file_deletes: bool) -> RangeDrops {
    let mut created: HashSet<Uuid> = HashSet::new();
    let mut deleted: HashSet<Uuid> = HashSet::new();
    let mut files_deleted: HashSet<Uuid> = HashSet::new();
    let mut inserts_in_range: HashSet<EventId> = HashSet::new();

    for &event in range {
        match &event.payload {
            EventPayload::FileCreated { file_id, .. } => {
                created.insert(*file_id);
            }
            EventPayload::FileDeleted { file_id, .. } => {
                deleted.insert(*file_id);
                files_deleted.insert(*file_id);
            }
            EventPayload::DirectoryCreated { directory_id, .. } => {
                created.insert(*directory_id);
            }
            EventPayload::DirectoryDeleted { directory_id, .. } => {
                deleted.insert(*directory_id);
            }
            EventPayload::CharInserted { .. } => {
                inserts_in_range.insert(event.id());
            }
            _ => {}
        }
    }

    let vanished: HashSet<Uuid> = created.intersection(&deleted).copied().collect();

    let mut drops = RangeDrops::default();
    for &event in range {
        if vanished.contains(&event.payload.subject_id()) {
            drops.dropped.insert(event.id());
            continue;
        }
        match &event.payload {
            EventPayload::CharInserted { file_id, .. } => {
                if collapse_file_deletes && files_deleted.contains(file_id) {
                    drops.dropped.insert(event.id());
                }
            }
            EventPayload::CharDeleted {
                file_id, target_id, ..
            } => {
                if inserts_in_range.contains(target_id) {
                    drops.dropped.insert(event.id());
                    drops.dropped.insert(*target_id);
                } else if collapse_file_deletes && files_deleted.contains(file_id) {
                    drops.dropped.insert(event.id());
                }
            }
            _ => {}
        }
    }

    for &event in range {
        if let EventPayload::CharInserted { predecessor_id, .. } = &event.payload {
            if drops.dropped.contains(&event.id()) {
                drops
                    .dropped_insert_predecessor
                    .insert(event.id(), *predecessor_id);
            }
        }
    }

    drops
}

/// Clones an insert event with a fresh position and predecessor link.
fn readdressed_insert(
    original: &Event,
    row: usize,
    col: usize,
    predecessor: Option<EventId>,
) -> Event {
    let mut event = original.clone();
    event.metadata.sequence = None;
    if let EventPayload::CharInserted {
        line,
        column,
        predecessor_id,
        ..
    } = &mut event.payload
    {
        *line = row as u64 + 1;
        *column = col as u64 + 1;
        *predecessor_id = predecessor;
    }
    event
}

/// Clones a delete event with a fresh position.
fn readdressed_delete(original: &Event, row: usize, col: usize) -> Event {
    let mut event = original.clone();
    event.metadata.sequence = None;
    if let EventPayload::CharDeleted { line, column, .. } = &mut event.payload {
        *line = row as u64 + 1;
        *column = col as u64 + 1;
    }
    event
}

fn advance(token: CharToken, row: &mut usize, col: &mut usize) {
    if token.is_line_break() {
        *row += 1;
        *col = 0;
    } else {
        *col += 1;
    }
}

/// Strategy (a): anchored events close ranges; every range is re-emitted
/// in canonical groups against a reconstruction of the filtered history.
fn collapse_checkpoints(events: &[Event], anchors: &CommentAnchors) -> Result<Vec<Event>> {
    let mut output = Vec::new();
    let mut original = DocSet::default();
    let mut filtered = DocSet::default();
    let mut range: Vec<&Event> = Vec::new();

    for event in events {
        range.push(event);
        if anchors.is_anchored(event.id()) {
            emit_collapsed_range(&range, &mut original, &mut filtered, &mut output)?;
            range.clear();
        }
    }
    if !range.is_empty() {
        emit_collapsed_range(&range, &mut original, &mut filtered, &mut output)?;
    }
    Ok(output)
}

fn emit_collapsed_range(
    range: &[&Event],
    original: &mut DocSet,
    filtered: &mut DocSet,
    output: &mut Vec<Event>,
) -> Result<()> {
    let drops = collect_drops(range, true);

    // Advance the as-recorded reconstruction through the whole range first;
    // it supplies the final position of every surviving insert.
    for &event in range {
        if !event.payload.is_filesystem() {
            original.apply_char(event)?;
        }
    }

    // Group 1: surviving file-system events, original order.
    for &event in range {
        if event.payload.is_filesystem() && !drops.dropped.contains(&event.id()) {
            output.push(event.clone());
        }
    }

    // Group 2: deletes of pre-range characters, re-addressed against the
    // filtered reconstruction and emitted bottom-of-file first so earlier
    // positions stay stable while they apply.
    let mut delete_files: Vec<Uuid> = Vec::new();
    let mut deletes_by_file: HashMap<Uuid, Vec<&Event>> = HashMap::new();
    for &event in range {
        if let EventPayload::CharDeleted { file_id, .. } = &event.payload {
            if !drops.dropped.contains(&event.id()) {
                if !deletes_by_file.contains_key(file_id) {
                    delete_files.push(*file_id);
                }
                deletes_by_file.entry(*file_id).or_default().push(event);
            }
        }
    }
    for file_id in delete_files {
        let deletes = deletes_by_file.remove(&file_id).unwrap_or_default();
        let mut ordered: Vec<((usize, usize), &Event)> = Vec::with_capacity(deletes.len());
        for event in deletes {
            let target_id = delete_target(event)?;
            let position = filtered
                .get(file_id)
                .and_then(|doc| doc.position_of(target_id))
                .ok_or_else(|| missing_character(target_id))?;
            ordered.push((position, event));
        }
        ordered.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, event) in ordered {
            let target_id = delete_target(event)?;
            let doc = filtered.doc(file_id);
            let (row, col) = doc
                .position_of(target_id)
                .ok_or_else(|| missing_character(target_id))?;
            output.push(readdressed_delete(event, row, col));
            doc.delete_at(row, col)?;
        }
    }

    // Group 3: surviving in-range inserts, re-addressed to their final
    // end-of-range position and emitted in document order.
    let mut insert_files: Vec<Uuid> = Vec::new();
    let mut survivors_by_file: HashMap<Uuid, HashSet<EventId>> = HashMap::new();
    let mut insert_by_id: HashMap<EventId, &Event> = HashMap::new();
    for &event in range {
        if let EventPayload::CharInserted { file_id, .. } = &event.payload {
            if !drops.dropped.contains(&event.id()) {
                if !survivors_by_file.contains_key(file_id) {
                    insert_files.push(*file_id);
                }
                survivors_by_file
                    .entry(*file_id)
                    .or_default()
                    .insert(event.id());
                insert_by_id.insert(event.id(), event);
            }
        }
    }
    for file_id in insert_files {
        let survivors = &survivors_by_file[&file_id];
        let final_records = original
            .get(file_id)
            .map(Document::records)
            .unwrap_or_default();

        // Walk the end-of-range document; every record is either already in
        // the filtered reconstruction or a surviving insert to emit here.
        let mut row = 0usize;
        let mut col = 0usize;
        for record in final_records {
            if survivors.contains(&record.event_id) {
                let doc = filtered.doc(file_id);
                let predecessor = doc.predecessor_id_at(row, col)?;
                let source = insert_by_id
                    .get(&record.event_id)
                    .ok_or_else(|| missing_character(record.event_id))?;
                output.push(readdressed_insert(source, row, col, predecessor));
                doc.insert_at(record.event_id, record.token, row, col)?;
            } else {
                let in_place = filtered
                    .get(file_id)
                    .and_then(|doc| doc.record_at(row, col))
                    .map(|r| r.event_id);
                if in_place != Some(record.event_id) {
                    return Err(CodetraceError::filter(
                        "reconstruction_divergence",
                        format!(
                            "Filtered document diverged from recorded history at \
                             ({row}, {col}) of file {file_id}"
                        ),
                        ORIGIN,
                    ));
                }
            }
            advance(record.token, &mut row, &mut col);
        }
    }

    Ok(())
}

/// Strategy (b): only complete tagged ranges cancel pairs; survivors keep
/// their original relative order and are re-addressed against the filtered
/// reconstruction.
fn collapse_tags(
    events: &[Event],
    anchors: &CommentAnchors,
    start_tag: &str,
    end_tag: &str,
) -> Result<Vec<Event>> {
    let mut drops = RangeDrops::default();
    let mut index = 0;
    while index < events.len() {
        let Some(start) = (index..events.len())
            .find(|&i| anchors.has_tag(events[i].id(), start_tag))
        else {
            break;
        };
        let Some(end) =
            (start + 1..events.len()).find(|&i| anchors.has_tag(events[i].id(), end_tag))
        else {
            // Unterminated range: no filtering for the remainder of the log.
            break;
        };

        let interior: Vec<&Event> = events[start + 1..end].iter().collect();
        let range_drops = collect_drops(&interior, false);
        drops.dropped.extend(range_drops.dropped);
        drops
            .dropped_insert_predecessor
            .extend(range_drops.dropped_insert_predecessor);
        index = end + 1;
    }

    let mut filtered = DocSet::default();
    let mut output = Vec::new();
    // Predecessor of each character taken out by a surviving delete,
    // captured at removal time so later inserts can chain past it.
    let mut removed: HashMap<EventId, Option<EventId>> = HashMap::new();
    for event in events {
        if drops.dropped.contains(&event.id()) {
            continue;
        }
        match &event.payload {
            EventPayload::CharInserted {
                file_id,
                token,
                predecessor_id,
                ..
            } => {
                let predecessor = resolve_predecessor(
                    *predecessor_id,
                    &drops.dropped_insert_predecessor,
                    &removed,
                );
                let doc = filtered.doc(*file_id);
                let (row, col) = insertion_point_after(doc, predecessor)?;
                output.push(readdressed_insert(event, row, col, predecessor));
                doc.insert_at(event.id(), *token, row, col)?;
            }
            EventPayload::CharDeleted {
                file_id, target_id, ..
            } => {
                let doc = filtered.doc(*file_id);
                let (row, col) = doc
                    .position_of(*target_id)
                    .ok_or_else(|| missing_character(*target_id))?;
                removed.insert(*target_id, doc.predecessor_id_at(row, col)?);
                output.push(readdressed_delete(event, row, col));
                doc.delete_at(row, col)?;
            }
            _ => output.push(event.clone()),
        }
    }
    Ok(output)
}

/// Follows predecessor links until a character still present in the
/// filtered reconstruction (or the start-of-file sentinel) is reached,
/// chaining through both dropped inserts and characters taken out by
/// surviving deletes.
fn resolve_predecessor(
    mut predecessor: Option<EventId>,
    dropped: &HashMap<EventId, Option<EventId>>,
    removed: &HashMap<EventId, Option<EventId>>,
) -> Option<EventId> {
    while let Some(id) = predecessor {
        if let Some(next) = dropped.get(&id) {
            predecessor = *next;
        } else if let Some(next) = removed.get(&id) {
            predecessor = *next;
        } else {
            return Some(id);
        }
    }
    None
}

/// Returns the position directly after a predecessor character, which is
/// where an insert that recorded this predecessor must land.
fn insertion_point_after(doc: &Document, predecessor: Option<EventId>) -> Result<(usize, usize)> {
    let Some(id) = predecessor else {
        return Ok((0, 0));
    };
    let (row, col) = doc
        .position_of(id)
        .ok_or_else(|| missing_character(id))?;
    let record = doc
        .record_at(row, col)
        .ok_or_else(|| missing_character(id))?;
    if record.token.is_line_break() {
        Ok((row + 1, 0))
    } else {
        Ok((row, col + 1))
    }
}

fn delete_target(event: &Event) -> Result<EventId> {
    match &event.payload {
        EventPayload::CharDeleted { target_id, .. } => Ok(*target_id),
        other => Err(CodetraceError::filter(
            "not_a_delete",
            format!("Expected a character delete, got {other:?}"),
            ORIGIN,
        )),
    }
}

fn missing_character(id: EventId) -> CodetraceError {
    CodetraceError::filter(
        "character_missing",
        format!("Character {id} is absent from the filtered reconstruction"),
        ORIGIN,
    )
}

/// Shared postlude: dense renumbering and comment reanchoring.
fn finalize(
    original: &[Event],
    mut output: Vec<Event>,
    anchors: &CommentAnchors,
    mut reanchor: impl FnMut(EventId, EventId),
) -> Result<FilterOutcome> {
    for (index, event) in output.iter_mut().enumerate() {
        event.metadata.sequence = Some(index as u64);
    }
    let new_sequence: HashMap<EventId, u64> = output
        .iter()
        .enumerate()
        .map(|(index, event)| (event.id(), index as u64))
        .collect();

    // Paste provenance must not point at events the filter dropped.
    for event in &mut output {
        if let EventPayload::CharInserted { pasted_from, .. } = &mut event.payload {
            if pasted_from.is_some_and(|id| !new_sequence.contains_key(&id)) {
                *pasted_from = None;
            }
        }
    }

    let original_index: HashMap<EventId, usize> = original
        .iter()
        .enumerate()
        .map(|(index, event)| (event.id(), index))
        .collect();

    let mut rewritten = CommentAnchors::new();
    for (event_id, list) in anchors.iter() {
        if let Some(&sequence) = new_sequence.get(event_id) {
            for anchor in list {
                rewritten.attach(
                    *event_id,
                    CommentAnchor {
                        sequence,
                        ..anchor.clone()
                    },
                );
            }
            continue;
        }

        let Some(&index) = original_index.get(event_id) else {
            return Err(CodetraceError::filter(
                "anchor_unknown_event",
                format!("Comment anchored to unknown event {event_id}"),
                ORIGIN,
            ));
        };
        // Nearest surviving preceding event, falling back to the nearest
        // following one at the head of the log.
        let host = original[..index]
            .iter()
            .rev()
            .find_map(|e| new_sequence.get(&e.id()).map(|&s| (e.id(), s)))
            .or_else(|| {
                original[index + 1..]
                    .iter()
                    .find_map(|e| new_sequence.get(&e.id()).map(|&s| (e.id(), s)))
            });
        let Some((host_id, sequence)) = host else {
            return Err(CodetraceError::filter(
                "no_surviving_events",
                "Every event was dropped; nowhere to reattach comments",
                ORIGIN,
            ));
        };
        reanchor(*event_id, host_id);
        for anchor in list {
            rewritten.attach(
                host_id,
                CommentAnchor {
                    sequence,
                    ..anchor.clone()
                },
            );
        }
    }

    Ok(FilterOutcome {
        events: output,
        anchors: rewritten,
    })
}
