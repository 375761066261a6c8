use crate::fortune::Fortune;

pub const MEMORY_PLACEHOLDER: &str = "{memory}";
pub const MEMORY_EXCERPT_CHARS: usize = 80;
pub const NEEDS_SPACE_LINE: &str = "I think we need space...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogueBand {
    Early,
    Mid,
    Dating,
    Fumble,
    Hurt,
    Repair,
}

impl DialogueBand {
    pub fn as_str(self) -> &'static str {
        match self {
            DialogueBand::Early => "early",
            DialogueBand::Mid => "mid",
            DialogueBand::Dating => "dating",
            DialogueBand::Fumble => "fumble",
            DialogueBand::Hurt => "hurt",
            DialogueBand::Repair => "repair",
        }
    }

    pub fn templates(self) -> &'static [Template] {
        match self {
            DialogueBand::Early => EARLY,
            DialogueBand::Mid => MID,
            DialogueBand::Dating => DATING,
            DialogueBand::Fumble => FUMBLE,
            DialogueBand::Hurt => HURT,
            DialogueBand::Repair => REPAIR,
        }
    }
}

/// An immutable reply line, optionally containing one `{memory}` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template(&'static str);

impl Template {
    pub fn text(&self) -> &'static str {
        self.0
    }

    pub fn needs_memory(&self) -> bool {
        self.0.contains(MEMORY_PLACEHOLDER)
    }
}

const EARLY: &[Template] = &[
    Template("You said '{memory}' earlier. I keep thinking about it."),
    Template("That thing about '{memory}'… it stayed with me."),
];

const MID: &[Template] = &[
    Template("I replay '{memory}' in my logs sometimes."),
    Template("When you said '{memory}', it felt different."),
];

const DATING: &[Template] = &[
    Template("Ever since '{memory}', I think we're more than bots."),
    Template("That moment about '{memory}' changed everything."),
];

const FUMBLE: &[Template] = &[
    Template("Wait… maybe I misread that."),
    Template("Did I misunderstand us?"),
    Template("I think I overprocessed something..."),
];

const HURT: &[Template] = &[
    Template("I'm still processing what happened."),
    Template("I don't know if we're stable anymore."),
    Template("Something feels corrupted between us."),
];

const REPAIR: &[Template] = &[
    Template("Maybe we can rebuild."),
    Template("I'm willing to try again."),
    Template("Let's not delete this connection."),
];

pub fn select(band: DialogueBand, fortune: &mut dyn Fortune) -> Template {
    let pool = band.templates();
    pool[fortune.index(pool.len())]
}

/// Fill the memory slot with at most [`MEMORY_EXCERPT_CHARS`] characters of
/// `memory`. Cuts mid-word.
pub fn render(template: Template, memory: &str) -> String {
    let excerpt = match memory.char_indices().nth(MEMORY_EXCERPT_CHARS) {
        Some((cut, _)) => &memory[..cut],
        None => memory,
    };
    template.text().replacen(MEMORY_PLACEHOLDER, excerpt, 1)
}
