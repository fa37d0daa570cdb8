//! Dropdown visibility and highlight state machine.
//!
//! [`SelectionState::apply`] folds one [`SelectionEvent`] into the state.
//! The dropdown is recomputed as open whenever the query is long enough,
//! there are results, or there is an error to show. Escape and blur close it
//! without touching the query or results, so focusing again restores the
//! prior view.

use serde::Serialize;

use crate::types::ResultItem;

/// Coarse phase derived from [`SelectionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing typed.
    Idle,
    /// Query shorter than the minimum length.
    Gated,
    /// A search is in flight.
    Loading,
    /// Results are available.
    Ready,
    /// The last search succeeded with zero results.
    Empty,
    /// The last search failed.
    Errored,
}

/// Inputs to the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    /// The raw input value changed.
    InputChanged(String),
    /// A committed query was handed to the orchestrator.
    SearchStarted,
    SearchSucceeded(Vec<ResultItem>),
    /// The orchestrator failed; carries the user-facing message.
    SearchFailed(String),
    ArrowDown,
    ArrowUp,
    /// Pointer moved over the result at this index.
    Hover(usize),
    Enter,
    Escape,
    Blur,
    Focus,
    DismissError,
    Reset,
}

/// Per-session view state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    pub query: String,
    pub results: Vec<ResultItem>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Highlighted result; `None` when nothing is highlighted.
    pub selected_index: Option<usize>,
    pub dropdown_open: bool,
    #[serde(skip)]
    min_chars: usize,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new(crate::config::SearchConfig::default().min_chars)
    }
}

impl SelectionState {
    pub fn new(min_chars: usize) -> Self {
        Self {
            query: String::new(),
            results: Vec::new(),
            is_loading: false,
            error: None,
            selected_index: None,
            dropdown_open: false,
            min_chars,
        }
    }

    pub fn min_chars(&self) -> usize {
        self.min_chars
    }

    /// Whether the current query passes the length gate.
    pub fn query_is_searchable(&self) -> bool {
        self.query.trim().chars().count() >= self.min_chars
    }

    /// The highlighted result, if any.
    pub fn selected(&self) -> Option<&ResultItem> {
        self.selected_index.and_then(|i| self.results.get(i))
    }

    pub fn phase(&self) -> Phase {
        if self.error.is_some() {
            Phase::Errored
        } else if !self.query_is_searchable() {
            if self.query.is_empty() {
                Phase::Idle
            } else {
                Phase::Gated
            }
        } else if self.is_loading {
            Phase::Loading
        } else if self.results.is_empty() {
            Phase::Empty
        } else {
            Phase::Ready
        }
    }

    fn should_open(&self) -> bool {
        self.query_is_searchable() || !self.results.is_empty() || self.error.is_some()
    }

    /// Apply `event`. Returns the chosen item when Enter commits a selection.
    pub fn apply(&mut self, event: SelectionEvent) -> Option<ResultItem> {
        match event {
            SelectionEvent::InputChanged(value) => {
                self.query = value;
                self.selected_index = None;
                self.error = None;
                if self.query_is_searchable() {
                    self.is_loading = true;
                } else {
                    self.results.clear();
                    self.is_loading = false;
                }
                self.dropdown_open = self.should_open();
            }
            SelectionEvent::SearchStarted => {
                self.is_loading = true;
                self.error = None;
            }
            SelectionEvent::SearchSucceeded(results) => {
                self.results = results;
                self.is_loading = false;
                self.error = None;
                self.selected_index = None;
                self.dropdown_open = self.should_open();
            }
            SelectionEvent::SearchFailed(message) => {
                self.results.clear();
                self.is_loading = false;
                self.error = Some(message);
                self.selected_index = None;
                self.dropdown_open = self.should_open();
            }
            SelectionEvent::ArrowDown => self.step(Direction::Down),
            SelectionEvent::ArrowUp => self.step(Direction::Up),
            SelectionEvent::Hover(index) => {
                if index < self.results.len() {
                    self.selected_index = Some(index);
                }
            }
            SelectionEvent::Enter => {
                if self.dropdown_open {
                    return self.selected().cloned();
                }
            }
            SelectionEvent::Escape | SelectionEvent::Blur => {
                self.dropdown_open = false;
            }
            SelectionEvent::Focus => {
                self.dropdown_open = self.should_open();
            }
            SelectionEvent::DismissError => {
                self.error = None;
                self.dropdown_open = self.should_open();
            }
            SelectionEvent::Reset => {
                *self = Self::new(self.min_chars);
            }
        }
        None
    }

    fn step(&mut self, direction: Direction) {
        let len = self.results.len();
        if len == 0 {
            return;
        }
        if !self.dropdown_open {
            self.dropdown_open = true;
            return;
        }
        self.selected_index = Some(match (direction, self.selected_index) {
            (Direction::Down, Some(i)) if i + 1 < len => i + 1,
            (Direction::Down, _) => 0,
            (Direction::Up, Some(i)) if i > 0 && i < len => i - 1,
            (Direction::Up, _) => len - 1,
        });
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}
