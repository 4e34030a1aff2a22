use crate::eval::{Bound, EvalValue};

/// One `info` line's worth of search data for a single multipv slot.
///
/// All fields start unset and are filled in incrementally as an `info`
/// line is parsed; a field left `None` means the engine never reported it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThinkPV {
    pub depth: Option<i64>,
    pub seldepth: Option<i64>,
    pub nodes: Option<i64>,
    pub nps: Option<i64>,
    pub hashfull: Option<i64>,
    pub time: Option<i64>,
    pub pv: Option<String>,
    pub eval: Option<EvalValue>,
    pub bound: Bound,
}

impl ThinkPV {
    pub fn to_string(&self) -> String {
        let mut parts = Vec::new();
        if let Some(d) = self.depth {
            parts.push(format!("depth {d}"));
        }
        if let Some(s) = self.seldepth {
            parts.push(format!("seldepth {s}"));
        }
        if let Some(eval) = self.eval {
            let bound = self.bound.to_string();
            if bound.is_empty() {
                parts.push(eval.to_string());
            } else {
                parts.push(format!("{eval} {bound}"));
            }
        }
        if let Some(n) = self.nodes {
            parts.push(format!("nodes {n}"));
        }
        if let Some(t) = self.time {
            parts.push(format!("time {t}"));
        }
        if let Some(h) = self.hashfull {
            parts.push(format!("hashfull {h}"));
        }
        if let Some(nps) = self.nps {
            parts.push(format!("nps {nps}"));
        }
        if let Some(pv) = &self.pv {
            parts.push(format!("pv {pv}"));
        }
        parts.join(" ")
    }
}

/// Accumulated result of a single `go`. Rebound fresh on every `go`; callers
/// must snapshot through the driver's state lock rather than hold onto a
/// reference across a subsequent `go`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThinkResult {
    pub bestmove: Option<String>,
    pub ponder: Option<String>,
    pub pvs: Vec<Option<ThinkPV>>,
    pub checkmate: Option<String>,
}

impl ThinkResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_search_done(&self) -> bool {
        self.bestmove.is_some()
    }

    pub fn is_mate_search_done(&self) -> bool {
        self.checkmate.is_some()
    }

    /// Stores `pv` at `multipv` (1-based), growing `pvs` with `None` as
    /// needed.
    pub fn set_pv(&mut self, multipv: usize, pv: ThinkPV) {
        let idx = multipv.saturating_sub(1);
        if self.pvs.len() <= idx {
            self.pvs.resize(idx + 1, None);
        }
        self.pvs[idx] = Some(pv);
    }

    pub fn to_string(&self) -> String {
        let mut lines = Vec::new();
        for pv in self.pvs.iter().flatten() {
            lines.push(pv.to_string());
        }
        if let Some(bm) = &self.bestmove {
            let mut line = format!("bestmove {bm}");
            if let Some(p) = &self.ponder {
                line.push_str(&format!(" ponder {p}"));
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}
