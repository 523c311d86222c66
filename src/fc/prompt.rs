use std::collections::VecDeque;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use crate::protocol::canonical::{Content, FunctionDeclaration, Role};

// ---------------------------------------------------------------------------
// Fixed dialogue text
// ---------------------------------------------------------------------------

const PROMPT_HEAD: &str =
    "Here are the tools available for you to use in answering the question:\n\n";

const PROMPT_TAIL: &str = concat!(
    "\nTo call a tool, use a <tool_call> block like this:\n",
    "\n",
    "<tool_call>\n",
    "name: |-\n",
    "\tfunction_name\n",
    "parameters:\n",
    "  arg0: 42\n",
    "  arg1: |\n",
    "    print(\"Hello, World!\")\n",
    "</tool_call>\n",
    "\n",
    "You can use one or more <tool_call> blocks to call tools as needed before providing your final answer. Make sure to only call one tool per <tool_call> block.\n",
    "\n",
    "First, perform any necessary reasoning in a <reasoning> block. If at any point during your reasoning you need to use a tool, call it with a <tool_call> block, carefully following the JSON schema provided for that tool in the <tools> section above.\n",
    "\n",
    "You must wait for the user to provide <tool_response> before providing a final response.\n",
    "\n",
    "After you have finished all reasoning and tool usage, provide your final answer to the question for the user. There is no need to use any special formatting for your final answer.\n",
    "\n",
    "Always use YAML literal style when representing strings in YAML.",
);

const PROMPT_ACK: &str =
    "<reasoning>I should follow the instructions above.</reasoning>\n\nI will follow the instructions.";

const EXAMPLE_REQUEST: &str = "Call test_function0 with apple = \"1\" arg.";

const EXAMPLE_CALL: &str = concat!(
    "<reasoning>I should call the test_function0 that the user requested.</reasoning>\n",
    "\n",
    "<tool_call>\n",
    "name: |-\n",
    "\ttest_function0\n",
    "parameters:\n",
    "\tapple: |-\n",
    "\t\t1\n",
    "</tool_call>",
);

const EXAMPLE_RESPONSE: &str = "<tool_response>\nexit_code: 0\n</tool_response>";

const EXAMPLE_ANSWER: &str =
    "<reasoning>I should return the exit code of 0.</reasoning>\n\nThe test_function0 exited with exit code 0.";

/// Number of turns [`few_shot_dialogue`] prepends to the history.
pub const FEW_SHOT_TURNS: usize = 6;

// ---------------------------------------------------------------------------
// Prompt cache
// ---------------------------------------------------------------------------

static PROMPT_CACHE: LazyLock<RwLock<PromptCache>> =
    LazyLock::new(|| RwLock::new(PromptCache::new()));

const PROMPT_CACHE_CAPACITY: usize = 64;

struct PromptCacheEntry {
    tools: Vec<FunctionDeclaration>,
    prompt: Arc<str>,
}

#[derive(Default)]
struct PromptCache {
    entries: VecDeque<PromptCacheEntry>,
}

impl PromptCache {
    fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(PROMPT_CACHE_CAPACITY),
        }
    }

    fn get(&self, tools: &[FunctionDeclaration]) -> Option<Arc<str>> {
        self.entries
            .iter()
            .rfind(|entry| entry.tools == tools)
            .map(|entry| Arc::clone(&entry.prompt))
    }

    fn insert(&mut self, tools: &[FunctionDeclaration], prompt: &Arc<str>) {
        if let Some(pos) = self.entries.iter().position(|entry| entry.tools == tools) {
            self.entries.remove(pos);
        }
        if self.entries.len() >= PROMPT_CACHE_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(PromptCacheEntry {
            tools: tools.to_vec(),
            prompt: Arc::clone(prompt),
        });
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render declarations as a `<tools>` block, one `<tool>` per declaration in
/// declaration order. Declarations that fail to serialize are skipped.
#[must_use]
pub fn render_tools_block(tools: &[FunctionDeclaration]) -> String {
    let mut out = String::from("<tools>\n");
    for tool in tools {
        match serde_yaml::to_string(tool) {
            Ok(yaml) => {
                out.push_str("<tool>\n");
                out.push_str(&yaml);
                out.push_str("</tool>\n");
            }
            Err(err) => {
                tracing::warn!(tool = %tool.name, "softcall: skipping tool declaration: {err}");
            }
        }
    }
    out.push_str("</tools>\n");
    out
}

/// The instruction prompt for `tools`, or `None` when there are no tools.
///
/// Rendered prompts are memoized per tool list.
#[must_use]
pub fn instruction_prompt(tools: &[FunctionDeclaration]) -> Option<Arc<str>> {
    if tools.is_empty() {
        return None;
    }
    if let Some(prompt) = PROMPT_CACHE.read().get(tools) {
        return Some(prompt);
    }

    let block = render_tools_block(tools);
    let mut text = String::with_capacity(PROMPT_HEAD.len() + block.len() + PROMPT_TAIL.len());
    text.push_str(PROMPT_HEAD);
    text.push_str(&block);
    text.push_str(PROMPT_TAIL);
    let prompt: Arc<str> = Arc::from(text);

    PROMPT_CACHE.write().insert(tools, &prompt);
    Some(prompt)
}

/// The fixed six-turn priming dialogue that opens every emulated chat.
#[must_use]
pub fn few_shot_dialogue(prompt: &str) -> Vec<Content> {
    vec![
        Content::text(Role::User, prompt),
        Content::text(Role::Model, PROMPT_ACK),
        Content::text(Role::User, EXAMPLE_REQUEST),
        Content::text(Role::Model, EXAMPLE_CALL),
        Content::text(Role::User, EXAMPLE_RESPONSE),
        Content::text(Role::Model, EXAMPLE_ANSWER),
    ]
}
