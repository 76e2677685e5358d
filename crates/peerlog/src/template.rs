//! Log line format templates
//!
//! A template string mixes literal characters with single-letter
//! directives (`d`=date, `c`=class, `h`=object hash, `t`=thread,
//! `p`=priority, `m`=message, `u`=host identity); `\` escapes the next
//! character. It compiles once into an instruction sequence that external
//! formatters execute per record; the core only ever sees the resulting
//! preformatted bytes.

/// One field a formatter substitutes into the line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// `d`: record timestamp
    Date,
    /// `c`: originating class or module
    Class,
    /// `h`: identity hash of the logging object
    ObjectHash,
    /// `t`: thread name
    Thread,
    /// `p`: priority name
    Priority,
    /// `m`: the message itself
    Message,
    /// `u`: host identity token
    HostIdent,
}

impl Directive {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'd' => Some(Self::Date),
            'c' => Some(Self::Class),
            'h' => Some(Self::ObjectHash),
            't' => Some(Self::Thread),
            'p' => Some(Self::Priority),
            'm' => Some(Self::Message),
            'u' => Some(Self::HostIdent),
            _ => None,
        }
    }
}

/// One compiled template step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Literal(String),
    Directive(Directive),
}

/// A compiled line template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTemplate {
    instructions: Vec<Instruction>,
}

/// Template used when none is configured
pub const DEFAULT_TEMPLATE: &str = "d:c:h:t:p:m";

impl LineTemplate {
    /// Compile a template string. An empty string compiles the default
    /// template.
    pub fn compile(fmt: &str) -> Self {
        let fmt = if fmt.is_empty() { DEFAULT_TEMPLATE } else { fmt };

        let mut instructions = Vec::new();
        let mut literal = String::new();
        let mut escaped = false;
        for c in fmt.chars() {
            let directive = Directive::from_char(c);
            match directive {
                Some(d) if !escaped => {
                    if !literal.is_empty() {
                        instructions.push(Instruction::Literal(std::mem::take(&mut literal)));
                    }
                    instructions.push(Instruction::Directive(d));
                }
                _ => {
                    if !escaped && c == '\\' {
                        escaped = true;
                        continue;
                    }
                    escaped = false;
                    literal.push(c);
                }
            }
        }
        if !literal.is_empty() {
            instructions.push(Instruction::Literal(literal));
        }
        Self { instructions }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Whether the template references the host identity token
    pub fn uses_host_ident(&self) -> bool {
        self.instructions
            .iter()
            .any(|i| matches!(i, Instruction::Directive(Directive::HostIdent)))
    }
}

impl Default for LineTemplate {
    fn default() -> Self {
        Self::compile(DEFAULT_TEMPLATE)
    }
}
