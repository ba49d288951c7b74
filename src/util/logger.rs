use super::Trace;

impl Trace {
    /// Order of this trace level; a call site logs when `self.order() >= threshold.order()`.
    pub fn order(&self) -> u8 {
        match self {
            Trace::None => 0,
            Trace::Default => 1,
            Trace::Success => 2,
            Trace::Result => 3,
            Trace::Verbose => 4,
        }
    }

    pub fn at_least(&self, threshold: Trace) -> bool {
        self.order() >= threshold.order()
    }
}
