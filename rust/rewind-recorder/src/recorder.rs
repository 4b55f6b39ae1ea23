//! Recorder facade: the entry point the host calls at every instrumented
//! operation.
//!
//! A [`Recorder`] is one trace session. It decides whether the executing
//! frame is in scope and, if so, drives the [`Encoder`] and writes each
//! resulting record group to the log in one piece.
//!
//! Two flags gate every hook:
//! - the session flag, set when the recorder is created and cleared for good
//!   by [`Recorder::deactivate`], [`Recorder::finish`] or a write failure;
//! - the frame flag, the decision of the innermost frame on the
//!   [`ScopeStack`], recomputed on every frame push and pop.
//!
//! Event hooks test the frame flag and nothing else, so the common
//! untraced path is a single branch. Hooks never fail: an I/O error ends the
//! session and is reported through [`SessionSummary::truncated`].

use crate::config::RecorderConfig;
use crate::error::RecorderError;
use crate::host::{Diagnostic, FrameView, Host, Shape, SliceBounds, Value};
use crate::registry::IdentityRegistry;
use crate::scope::{ScopeFilter, ScopeStack};
use crate::trace::encoder::Encoder;
use crate::trace::record::{Arg, Record, DEALLOC};
use crate::trace::sink::LogSink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Session summary
// ---------------------------------------------------------------------------

/// What a finished session produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Records written, comments excluded.
    pub records: u64,
    /// Definition records written, placeholders included.
    pub definitions: u64,
    pub placeholders: u64,
    /// Objects still holding a token when the session ended.
    pub live_objects: usize,
    /// `sha256:<hex>` digest of the log bytes, absent if the final flush failed.
    pub digest: Option<String>,
    /// The session ended early because the log could not be written.
    pub truncated: bool,
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

pub struct Recorder<W: Write> {
    sink: Option<LogSink<W>>,
    encoder: Encoder,
    filter: ScopeFilter,
    scope: ScopeStack,
    active: bool,
    tracing: bool,
    last_line: Option<u32>,
    truncated: bool,
    run_id: Uuid,
    started_at: DateTime<Utc>,
}

impl Recorder<BufWriter<File>> {
    /// Create the log file named by `config` and start a session.
    pub fn open(config: &RecorderConfig) -> Result<Self, RecorderError> {
        config.validate()?;
        let file = File::create(&config.log_path).map_err(|source| RecorderError::Open {
            path: config.log_path.clone(),
            source,
        })?;
        let recorder = Self::with_writer(BufWriter::new(file), config.base_dir.clone());
        if recorder.truncated {
            return Err(RecorderError::Io(io::Error::other(
                "failed to write log header",
            )));
        }
        info!(
            run_id = %recorder.run_id,
            log = %config.log_path.display(),
            base_dir = ?config.base_dir,
            "trace session started"
        );
        Ok(recorder)
    }
}

impl<W: Write> Recorder<W> {
    /// Start a session writing to `out`. With a base directory, only frames
    /// whose source lies under it are traced and the log opens with a
    /// `BASE_DIR` record.
    pub fn with_writer(out: W, base_dir: Option<PathBuf>) -> Self {
        let mut recorder = Recorder {
            sink: Some(LogSink::new(out)),
            encoder: Encoder::new(),
            filter: ScopeFilter::new(base_dir),
            scope: ScopeStack::new(),
            active: true,
            tracing: false,
            last_line: None,
            truncated: false,
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        };
        if let Some(base) = recorder.filter.base_dir() {
            let header = Record::new("BASE_DIR").str(base.to_string_lossy());
            recorder.event(header);
        }
        recorder
    }

    /// A recorder whose session never starts. Every hook is a no-op.
    pub fn inactive() -> Self {
        Recorder {
            sink: None,
            encoder: Encoder::new(),
            filter: ScopeFilter::everything(),
            scope: ScopeStack::new(),
            active: false,
            tracing: false,
            last_line: None,
            truncated: false,
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether operations of the current frame are being logged.
    pub fn is_tracing(&self) -> bool {
        self.tracing
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Number of frames entered since the session started and not yet left.
    pub fn depth(&self) -> usize {
        self.scope.depth()
    }

    pub fn registry(&self) -> &IdentityRegistry {
        self.encoder.registry()
    }

    pub fn records_written(&self) -> u64 {
        self.sink.as_ref().map_or(0, LogSink::records)
    }

    /// The underlying writer, while the session holds one.
    pub fn writer(&self) -> Option<&W> {
        self.sink.as_ref().map(LogSink::get_ref)
    }

    /// End the session. Later hooks are no-ops; there is no way back.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.tracing = false;
    }

    /// End the session, flush the log and report what was written.
    pub fn finish(self) -> SessionSummary {
        self.into_parts().0
    }

    /// Like [`finish`](Self::finish), also handing back the writer.
    pub fn into_parts(mut self) -> (SessionSummary, Option<W>) {
        self.deactivate();
        let (writer, records, digest) = match self.sink.take().map(LogSink::finish) {
            Some(Ok((writer, records, digest))) => (Some(writer), records, Some(digest)),
            Some(Err(err)) => {
                warn!(run_id = %self.run_id, error = %err, "failed to flush trace log");
                self.truncated = true;
                (None, 0, None)
            }
            None => (None, 0, None),
        };
        let summary = SessionSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            records,
            definitions: self.encoder.definitions(),
            placeholders: self.encoder.placeholders(),
            live_objects: self.encoder.registry().len(),
            digest,
            truncated: self.truncated,
        };
        info!(
            run_id = %summary.run_id,
            records = summary.records,
            definitions = summary.definitions,
            truncated = summary.truncated,
            "trace session finished"
        );
        (summary, writer)
    }

    // -- frames -------------------------------------------------------------

    /// A frame is entered. Decides its scope and, when traced, logs
    /// `PUSH_FRAME` after defining the code object, globals and every bound
    /// slot value.
    pub fn push_frame<H: Host>(&mut self, host: &H, frame: &FrameView<'_, H::Object>) {
        if !self.active {
            return;
        }
        let traced = self.filter.admits(frame.filename);
        self.scope.push(traced);
        self.tracing = traced;
        if !traced {
            return;
        }
        self.last_line = None;

        let code = self.encoder.object(host, frame.code);
        let globals = self.encoder.object(host, frame.globals);
        let slots: Vec<Arg> = frame
            .slots
            .iter()
            .map(|slot| match slot {
                Some(value) => self.encoder.reference(host, value),
                None => Arg::None,
            })
            .collect();
        self.event(
            Record::new("PUSH_FRAME")
                .arg(code)
                .arg(globals)
                .args(slots),
        );
    }

    /// A frame is left. Logs `POP_FRAME` if the frame was traced, then
    /// resumes the caller's scope decision.
    pub fn pop_frame<H: Host>(&mut self, host: &H, frame: &FrameView<'_, H::Object>) {
        if !self.active {
            return;
        }
        if self.scope.pop() == Some(true) {
            self.last_line = None;
            let code = self.encoder.object(host, frame.code);
            self.event(Record::new("POP_FRAME").arg(code));
        }
        self.tracing = self.active && self.scope.current();
    }

    /// Position marker, written only when the line changes.
    pub fn visit_line(&mut self, line: u32) {
        if !self.tracing {
            return;
        }
        if self.mark_line(line) {
            self.commit();
        }
    }

    // -- bindings -----------------------------------------------------------

    pub fn store_local<H: Host>(&mut self, host: &H, slot: usize, value: &Value<H::Object>) {
        if !self.tracing {
            return;
        }
        let value = self.encoder.reference(host, value);
        self.event(Record::new("STORE_LOCAL").int(slot as i64).arg(value));
    }

    pub fn store_cell<H: Host>(&mut self, host: &H, cell: H::Object, value: &Value<H::Object>) {
        if !self.tracing {
            return;
        }
        let cell = self.encoder.object(host, cell);
        let value = self.encoder.reference(host, value);
        self.event(Record::new("STORE_CELL").arg(cell).arg(value));
    }

    /// Binding in a module or class namespace.
    pub fn store_name<H: Host>(
        &mut self,
        host: &H,
        ns: H::Object,
        name: H::Object,
        value: &Value<H::Object>,
    ) {
        self.namespace_store(host, "STORE_NAME", ns, name, value);
    }

    pub fn store_global<H: Host>(
        &mut self,
        host: &H,
        ns: H::Object,
        name: H::Object,
        value: &Value<H::Object>,
    ) {
        self.namespace_store(host, "STORE_GLOBAL", ns, name, value);
    }

    pub fn delete_global<H: Host>(&mut self, host: &H, ns: H::Object, name: H::Object) {
        if !self.tracing {
            return;
        }
        let ns = self.encoder.object(host, ns);
        let name = self.encoder.object(host, name);
        self.event(Record::new("DELETE_GLOBAL").arg(ns).arg(name));
    }

    pub fn store_attr<H: Host>(
        &mut self,
        host: &H,
        obj: H::Object,
        name: H::Object,
        value: &Value<H::Object>,
    ) {
        self.namespace_store(host, "STORE_ATTR", obj, name, value);
    }

    /// `obj` got a new attribute dictionary.
    pub fn assoc_dict<H: Host>(&mut self, host: &H, obj: H::Object, dict: H::Object) {
        if !self.tracing {
            return;
        }
        let obj = self.encoder.object(host, obj);
        let dict = self.encoder.object(host, dict);
        self.event(Record::new("OBJECT_ASSOC_DICT").arg(obj).arg(dict));
    }

    // -- lists --------------------------------------------------------------

    pub fn list_append<H: Host>(&mut self, host: &H, list: H::Object, value: &Value<H::Object>) {
        self.container_value(host, "LIST_APPEND", list, value);
    }

    pub fn list_insert<H: Host>(
        &mut self,
        host: &H,
        list: H::Object,
        index: i64,
        value: &Value<H::Object>,
    ) {
        if !self.tracing {
            return;
        }
        let list = self.encoder.object(host, list);
        let value = self.encoder.reference(host, value);
        self.event(Record::new("LIST_INSERT").arg(list).int(index).arg(value));
    }

    pub fn list_extend<H: Host>(&mut self, host: &H, list: H::Object, other: &Value<H::Object>) {
        self.container_value(host, "LIST_EXTEND", list, other);
    }

    pub fn list_remove<H: Host>(&mut self, host: &H, list: H::Object, value: &Value<H::Object>) {
        self.container_value(host, "LIST_REMOVE", list, value);
    }

    pub fn list_pop<H: Host>(&mut self, host: &H, list: H::Object, index: i64) {
        self.container_index(host, "LIST_POP", list, index);
    }

    pub fn list_clear<H: Host>(&mut self, host: &H, list: H::Object) {
        self.container_only(host, "LIST_CLEAR", list);
    }

    pub fn list_reverse<H: Host>(&mut self, host: &H, list: H::Object) {
        self.container_only(host, "LIST_REVERSE", list);
    }

    /// The list was reordered in place; logs its full new contents.
    pub fn list_sort<H: Host>(&mut self, host: &H, list: H::Object) {
        self.container_contents(host, "LIST_SORT", list);
    }

    pub fn list_store_index<H: Host>(
        &mut self,
        host: &H,
        list: H::Object,
        index: i64,
        value: &Value<H::Object>,
    ) {
        if !self.tracing {
            return;
        }
        let list = self.encoder.object(host, list);
        let value = self.encoder.reference(host, value);
        self.event(
            Record::new("LIST_STORE_SUBSCRIPT")
                .arg(list)
                .int(index)
                .arg(value),
        );
    }

    pub fn list_store_slice<H: Host>(
        &mut self,
        host: &H,
        list: H::Object,
        bounds: SliceBounds,
        value: &Value<H::Object>,
    ) {
        if !self.tracing {
            return;
        }
        let list = self.encoder.object(host, list);
        let value = self.encoder.reference(host, value);
        self.event(
            Record::new("LIST_STORE_SUBSCRIPT_SLICE")
                .arg(list)
                .args(slice_args(bounds))
                .arg(value),
        );
    }

    pub fn list_delete_index<H: Host>(&mut self, host: &H, list: H::Object, index: i64) {
        self.container_index(host, "LIST_DELETE_SUBSCRIPT", list, index);
    }

    pub fn list_delete_slice<H: Host>(&mut self, host: &H, list: H::Object, bounds: SliceBounds) {
        if !self.tracing {
            return;
        }
        let list = self.encoder.object(host, list);
        self.event(
            Record::new("LIST_DELETE_SUBSCRIPT_SLICE")
                .arg(list)
                .args(slice_args(bounds)),
        );
    }

    // -- dicts --------------------------------------------------------------

    pub fn dict_store<H: Host>(
        &mut self,
        host: &H,
        dict: H::Object,
        key: &Value<H::Object>,
        value: &Value<H::Object>,
    ) {
        self.container_entry(host, "DICT_STORE_SUBSCRIPT", dict, key, value);
    }

    pub fn dict_delete<H: Host>(&mut self, host: &H, dict: H::Object, key: &Value<H::Object>) {
        self.container_value(host, "DICT_DELETE_SUBSCRIPT", dict, key);
    }

    /// The dict's contents were replaced wholesale by those of `other`.
    pub fn dict_replace<H: Host>(&mut self, host: &H, dict: H::Object, other: H::Object) {
        self.container_value(host, "DICT_REPLACE", dict, &Value::Object(other));
    }

    pub fn dict_clear<H: Host>(&mut self, host: &H, dict: H::Object) {
        self.container_only(host, "DICT_CLEAR", dict);
    }

    pub fn dict_pop<H: Host>(&mut self, host: &H, dict: H::Object, key: &Value<H::Object>) {
        self.container_value(host, "DICT_POP", dict, key);
    }

    pub fn dict_pop_item<H: Host>(&mut self, host: &H, dict: H::Object, key: &Value<H::Object>) {
        self.container_value(host, "DICT_POP_ITEM", dict, key);
    }

    pub fn dict_set_default<H: Host>(
        &mut self,
        host: &H,
        dict: H::Object,
        key: &Value<H::Object>,
        value: &Value<H::Object>,
    ) {
        self.container_entry(host, "DICT_SET_DEFAULT", dict, key, value);
    }

    // -- sets ---------------------------------------------------------------

    pub fn set_add<H: Host>(&mut self, host: &H, set: H::Object, value: &Value<H::Object>) {
        self.container_value(host, "SET_ADD", set, value);
    }

    pub fn set_discard<H: Host>(&mut self, host: &H, set: H::Object, value: &Value<H::Object>) {
        self.container_value(host, "SET_DISCARD", set, value);
    }

    pub fn set_clear<H: Host>(&mut self, host: &H, set: H::Object) {
        self.container_only(host, "SET_CLEAR", set);
    }

    /// A bulk update (union, difference, intersection, ...) changed the
    /// set; logs its full new contents.
    pub fn set_update<H: Host>(&mut self, host: &H, set: H::Object) {
        self.container_contents(host, "SET_UPDATE", set);
    }

    // -- control flow -------------------------------------------------------

    /// `result` of `left += right` on strings. Logged only when the host
    /// reused one of the operands, i.e. mutated a string in place.
    pub fn string_inplace_add<H: Host>(
        &mut self,
        host: &H,
        left: &Value<H::Object>,
        right: &Value<H::Object>,
        result: H::Object,
    ) {
        if !self.tracing {
            return;
        }
        let reused = [left, right]
            .iter()
            .filter_map(|operand| operand.as_object())
            .any(|operand| host.same_object(operand, result));
        if !reused {
            return;
        }
        let Shape::Str(text) = host.shape(result) else {
            return;
        };
        let result = self.encoder.object(host, result);
        self.event(
            Record::new("STRING_INPLACE_ADD_RESULT")
                .arg(result)
                .str(text),
        );
    }

    pub fn return_value<H: Host>(&mut self, host: &H, value: &Value<H::Object>) {
        if !self.tracing {
            return;
        }
        let value = self.encoder.reference(host, value);
        self.event(Record::new("RETURN_VALUE").arg(value));
    }

    pub fn yield_value<H: Host>(&mut self, host: &H, value: &Value<H::Object>) {
        if !self.tracing {
            return;
        }
        let value = self.encoder.reference(host, value);
        self.event(Record::new("YIELD_VALUE").arg(value));
    }

    /// An exception is propagating out of the current frame. The last
    /// argument is the frame depth, so a reader can tell where it was caught.
    pub fn exception<H: Host>(
        &mut self,
        host: &H,
        exc: &Value<H::Object>,
        type_name: &str,
        message: &str,
    ) {
        if !self.tracing {
            return;
        }
        let exc = self.encoder.reference(host, exc);
        let depth = self.scope.depth() as i64;
        self.event(
            Record::new("EXCEPTION")
                .arg(exc)
                .str(type_name)
                .str(message)
                .int(depth),
        );
    }

    // -- lifecycle ----------------------------------------------------------

    /// `obj` is about to be freed. Its token is retired whenever the session
    /// is active, so a later object at the same address is defined afresh.
    /// The `DEALLOC` record itself is only written from traced frames.
    pub fn deallocate<H: Host>(&mut self, host: &H, obj: H::Object) {
        if !self.active {
            return;
        }
        let addr = host.address(obj);
        let Some(token) = self.encoder.forget(addr) else {
            return;
        };
        debug!(%addr, %token, "token retired");
        if self.tracing {
            self.event(Record::new(DEALLOC).token(token));
        }
    }

    /// Free-form instrumentation point, logged as a `--` comment after the
    /// position marker and any definitions its values need.
    pub fn diagnostic<H: Host>(&mut self, host: &H, diag: &Diagnostic<H::Object>) {
        if !self.tracing {
            return;
        }
        self.mark_line(diag.line);
        let args: Vec<String> = diag
            .values
            .iter()
            .map(|value| self.encoder.reference(host, value).to_string())
            .collect();
        self.commit();
        let text = format!("{}({}) on #{}", diag.label, args.join(", "), diag.line);
        let result = match self.sink.as_mut() {
            Some(sink) if self.active => sink.write_comment(&text),
            _ => Ok(()),
        };
        if let Err(err) = result {
            self.fail(err);
        }
    }

    // -- helpers ------------------------------------------------------------

    fn namespace_store<H: Host>(
        &mut self,
        host: &H,
        name: &'static str,
        ns: H::Object,
        key: H::Object,
        value: &Value<H::Object>,
    ) {
        if !self.tracing {
            return;
        }
        let ns = self.encoder.object(host, ns);
        let key = self.encoder.object(host, key);
        let value = self.encoder.reference(host, value);
        self.event(Record::new(name).arg(ns).arg(key).arg(value));
    }

    fn container_only<H: Host>(&mut self, host: &H, name: &'static str, container: H::Object) {
        if !self.tracing {
            return;
        }
        let container = self.encoder.object(host, container);
        self.event(Record::new(name).arg(container));
    }

    fn container_index<H: Host>(
        &mut self,
        host: &H,
        name: &'static str,
        container: H::Object,
        index: i64,
    ) {
        if !self.tracing {
            return;
        }
        let container = self.encoder.object(host, container);
        self.event(Record::new(name).arg(container).int(index));
    }

    fn container_value<H: Host>(
        &mut self,
        host: &H,
        name: &'static str,
        container: H::Object,
        value: &Value<H::Object>,
    ) {
        if !self.tracing {
            return;
        }
        let container = self.encoder.object(host, container);
        let value = self.encoder.reference(host, value);
        self.event(Record::new(name).arg(container).arg(value));
    }

    fn container_entry<H: Host>(
        &mut self,
        host: &H,
        name: &'static str,
        container: H::Object,
        key: &Value<H::Object>,
        value: &Value<H::Object>,
    ) {
        if !self.tracing {
            return;
        }
        let container = self.encoder.object(host, container);
        let key = self.encoder.reference(host, key);
        let value = self.encoder.reference(host, value);
        self.event(Record::new(name).arg(container).arg(key).arg(value));
    }

    /// Container reference followed by its current elements.
    fn container_contents<H: Host>(&mut self, host: &H, name: &'static str, container: H::Object) {
        if !self.tracing {
            return;
        }
        let items = match host.shape(container) {
            Shape::List(items) | Shape::Set(items) | Shape::Tuple(items) => items,
            other => {
                debug!(record = name, category = other.category(), "not a sequence, event skipped");
                return;
            }
        };
        let container = self.encoder.object(host, container);
        let items: Vec<Arg> = items
            .iter()
            .map(|item| self.encoder.reference(host, item))
            .collect();
        self.event(Record::new(name).arg(container).args(items));
    }

    /// Queue `VISIT(line)` if the line changed. Returns whether it did.
    fn mark_line(&mut self, line: u32) -> bool {
        if self.last_line == Some(line) {
            return false;
        }
        self.last_line = Some(line);
        self.encoder
            .emit(Record::new("VISIT").int(i64::from(line)));
        true
    }

    fn event(&mut self, record: Record) {
        self.encoder.emit(record);
        self.commit();
    }

    /// Write the pending group as one unit. Nothing reaches the sink once
    /// the session has ended.
    fn commit(&mut self) {
        let group = self.encoder.take_group();
        if !self.active {
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(err) = sink.write_group(&group) {
            self.fail(err);
        }
    }

    fn fail(&mut self, err: io::Error) {
        warn!(run_id = %self.run_id, error = %err, "trace log write failed, ending session");
        self.truncated = true;
        self.scope.clear();
        self.deactivate();
    }
}

fn slice_args(bounds: SliceBounds) -> [Arg; 3] {
    [
        Arg::opt_int(bounds.start),
        Arg::opt_int(bounds.stop),
        Arg::opt_int(bounds.step),
    ]
}
