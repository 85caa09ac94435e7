//! System instruction sent with every analysis.

/// The ten insight categories, in the order they are requested.
pub const CATEGORIES: &[&str] = &[
    "A key takeaway",
    "Something surprising",
    "An interesting connection",
    "A metaphor or analogy",
    "An expert perspective",
    "A different viewpoint",
    "A common mistake to avoid",
    "A thought-provoking idea",
    "A potential benefit",
    "A challenge and solution",
];

/// Maximum words per bullet.
pub const MAX_WORDS_PER_INSIGHT: usize = 15;

/// Build the fixed system instruction.
pub fn system_prompt() -> String {
    let mut prompt = String::from(
        "I am going to give you some text to analyze and you will return insights in a bulleted list format.\n",
    );
    prompt.push_str(&format!(
        "Generate {} different insights that include:\n",
        CATEGORIES.len()
    ));
    for category in CATEGORIES {
        prompt.push_str("• ");
        prompt.push_str(category);
        prompt.push('\n');
    }
    prompt.push_str("A few rules:\n");
    prompt.push_str("1. Avoid jargon\n");
    prompt.push_str(&format!(
        "2. Each bullet must be {} words or less\n",
        MAX_WORDS_PER_INSIGHT
    ));
    prompt.push_str("3. Be simple and clear.\n");
    prompt.push_str("4. Use colloquial language, as if you were personally reflecting.\n");
    prompt.push_str("Are you ready for the text");
    prompt
}
