/// Submission priority, one of the three `SUBMIT_JOB` wire variants.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub(crate) fn submit_command_name(self, background: bool) -> &'static str {
        match (self, background) {
            (Priority::Low, false) => "SUBMIT_JOB_LOW",
            (Priority::Low, true) => "SUBMIT_JOB_LOW_BG",
            (Priority::Normal, false) => "SUBMIT_JOB",
            (Priority::Normal, true) => "SUBMIT_JOB_BG",
            (Priority::High, false) => "SUBMIT_JOB_HIGH",
            (Priority::High, true) => "SUBMIT_JOB_HIGH_BG",
        }
    }
}
