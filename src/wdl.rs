//! Parser for the world-description language
//!
//! A document is a sequence of sections, each opened by a line containing one of
//! the section names. Blank lines and lines starting with `//` are skipped.
//!
//! ```text
//! Layout            rows of tiles: # wall, D door, E start, G goal, T terminal, @ toggle
//! Abstraction       a grid of symbols, then `symbol:name` lines
//! Behaviour         a grid of rule ids, then `id-action-[action:p,...]` lines
//! Rewards           a grid of reward symbols, then `symbol:value` lines
//! ```
//!
//! Every grid after the layout has one row per layout row; the lines that follow
//! it are the section's mappings.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
    str::FromStr,
};

use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};
use thiserror::Error;

use crate::{
    action::Action,
    rule::{ActionDistribution, RuleTable},
    world::{Abstraction, Location, Tile, WorldModel},
};

/// The four sections of a WDL document
#[derive(EnumIter, AsRefStr, Display, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Section {
    Layout,
    Abstraction,
    Behaviour,
    Rewards,
}

/// Errors that can occur while reading a WDL document
///
/// Line numbers are 1-based and refer to the original text.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to read world file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Layout section is missing or empty")]
    EmptyLayout,

    #[error("{section} line {line}: expected a row of width {expected}, found {found}")]
    MalformedLayout {
        section: Section,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("{section}: expected {expected} grid rows, found {found}")]
    MissingRows {
        section: Section,
        expected: usize,
        found: usize,
    },

    #[error("Layout: no start tile `E`")]
    MissingStart,

    #[error("Layout line {line}: second start tile `E`, the first is at {first}")]
    MultipleStarts { line: usize, first: Location },

    #[error("Layout: no goal tile `G`")]
    MissingGoal,

    #[error("{section} line {line}: malformed mapping `{text}`, expected `symbol:value`")]
    MalformedMapping {
        section: Section,
        line: usize,
        text: String,
    },

    #[error("Rewards line {line}: `{value}` is not an integer")]
    InvalidRewardValue { line: usize, value: String },

    #[error("Rewards: symbol `{symbol}` at {location} has no value")]
    UnboundRewardSymbol { symbol: char, location: Location },

    #[error("Behaviour line {line}: malformed rule `{text}`: {reason}")]
    MalformedRule {
        line: usize,
        text: String,
        reason: &'static str,
    },

    #[error("Behaviour line {line}: probabilities of rule `{rule}` for `{action}` sum to {sum}")]
    InvalidDistribution {
        line: usize,
        rule: char,
        action: Action,
        sum: f64,
    },
}

#[derive(Clone, Copy, Debug)]
struct Line<'a> {
    number: usize,
    text: &'a str,
}

/// Read and parse a WDL file
pub fn load(path: impl AsRef<Path>) -> Result<WorldModel, ParseError> {
    let text = fs::read_to_string(path)?;
    parse(&text)
}

/// Parse a WDL document into a [`WorldModel`]
pub fn parse(text: &str) -> Result<WorldModel, ParseError> {
    let sections = split_sections(text);
    let section = |s: Section| sections.get(&s).map_or(&[][..], Vec::as_slice);

    let mut layout = parse_layout(section(Section::Layout))?;
    let height = layout.len();
    let width = layout[0].len();

    let mut start = None;
    let mut goals = HashSet::new();
    let mut terminals = HashSet::new();
    let mut toggles = HashSet::new();
    for (row, line) in section(Section::Layout).iter().enumerate() {
        for (col, tile) in layout[row].iter_mut().enumerate() {
            let location = Location::new(row, col);
            match *tile {
                Tile::Start => {
                    if let Some(first) = start {
                        return Err(ParseError::MultipleStarts {
                            line: line.number,
                            first,
                        });
                    }
                    start = Some(location);
                    *tile = Tile::Empty;
                }
                Tile::Goal => {
                    goals.insert(location);
                }
                Tile::Terminal => {
                    terminals.insert(location);
                }
                Tile::Toggle => {
                    toggles.insert(location);
                }
                _ => {}
            }
        }
    }
    let start = start.ok_or(ParseError::MissingStart)?;
    if goals.is_empty() {
        return Err(ParseError::MissingGoal);
    }

    let abstraction = parse_abstraction(section(Section::Abstraction), height, width)?;
    let (rules, rule_placement) = parse_behaviour(section(Section::Behaviour), height, width)?;
    let rewards = parse_rewards(section(Section::Rewards), height, width)?;

    log::debug!(
        "parsed {height}x{width} world: {} goals, {} terminals, {} rules on {} cells, \
         {} reward tiles, abstraction {}",
        goals.len(),
        terminals.len(),
        rules.len(),
        rule_placement.len(),
        rewards.len(),
        if abstraction.is_some() { "present" } else { "absent" },
    );

    Ok(WorldModel {
        layout,
        abstraction,
        rewards,
        rules,
        rule_placement,
        start,
        goals,
        terminals,
        toggles,
    })
}

impl FromStr for WorldModel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

fn split_sections(text: &str) -> HashMap<Section, Vec<Line<'_>>> {
    let mut sections: HashMap<Section, Vec<Line>> = HashMap::new();
    let mut current = None;

    for (i, raw) in text.lines().enumerate() {
        let text = raw.trim_end();
        if text.trim_start().is_empty() || text.trim_start().starts_with("//") {
            continue;
        }

        // The last matching name wins, as headers are plain substrings
        if let Some(header) = Section::iter().filter(|s| text.contains(s.as_ref())).last() {
            current = Some(header);
            continue;
        }

        match current {
            Some(section) => sections.entry(section).or_default().push(Line {
                number: i + 1,
                text,
            }),
            None => log::warn!("line {} precedes any section header, ignoring it", i + 1),
        }
    }

    sections
}

fn parse_layout(lines: &[Line]) -> Result<Vec<Vec<Tile>>, ParseError> {
    let first = lines.first().ok_or(ParseError::EmptyLayout)?;
    let width = first.text.chars().count();

    lines
        .iter()
        .map(|line| {
            let row: Vec<Tile> = line.text.chars().map(Tile::from).collect();
            if row.len() == width {
                Ok(row)
            } else {
                Err(ParseError::MalformedLayout {
                    section: Section::Layout,
                    line: line.number,
                    expected: width,
                    found: row.len(),
                })
            }
        })
        .collect()
}

/// Split an overlay section into its grid (padded to the layout width) and its mapping lines
fn split_overlay<'a, 'b>(
    section: Section,
    lines: &'b [Line<'a>],
    height: usize,
    width: usize,
) -> Result<(Vec<Vec<char>>, &'b [Line<'a>]), ParseError> {
    if lines.len() < height {
        return Err(ParseError::MissingRows {
            section,
            expected: height,
            found: lines.len(),
        });
    }

    let (rows, mappings) = lines.split_at(height);
    let grid = rows
        .iter()
        .map(|line| {
            let mut row: Vec<char> = line.text.chars().collect();
            if row.len() > width {
                return Err(ParseError::MalformedLayout {
                    section,
                    line: line.number,
                    expected: width,
                    found: row.len(),
                });
            }
            row.resize(width, ' ');
            Ok(row)
        })
        .collect::<Result<_, _>>()?;

    Ok((grid, mappings))
}

/// Split a `key:value` line, requiring a single-character key
fn split_mapping<'a>(section: Section, line: &Line<'a>) -> Result<(char, &'a str), ParseError> {
    let malformed = || ParseError::MalformedMapping {
        section,
        line: line.number,
        text: line.text.to_owned(),
    };

    let (key, value) = line.text.split_once(':').ok_or_else(malformed)?;
    let mut chars = key.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(symbol), None) => Ok((symbol, value.trim())),
        _ => Err(malformed()),
    }
}

fn parse_abstraction(
    lines: &[Line],
    height: usize,
    width: usize,
) -> Result<Option<Abstraction>, ParseError> {
    if lines.is_empty() {
        return Ok(None);
    }

    let (grid, mappings) = split_overlay(Section::Abstraction, lines, height, width)?;
    let names = mappings
        .iter()
        .map(|line| {
            let (symbol, name) = split_mapping(Section::Abstraction, line)?;
            Ok((symbol, name.to_owned()))
        })
        .collect::<Result<HashMap<_, _>, ParseError>>()?;

    Ok(Some(Abstraction::new(grid, names)))
}

fn parse_behaviour(
    lines: &[Line],
    height: usize,
    width: usize,
) -> Result<(RuleTable, HashMap<Location, char>), ParseError> {
    let mut rules = RuleTable::new();
    let mut placement = HashMap::new();
    if lines.is_empty() {
        return Ok((rules, placement));
    }

    let (grid, rule_lines) = split_overlay(Section::Behaviour, lines, height, width)?;
    for line in rule_lines {
        let (id, intended, distribution) = parse_rule(line)?;
        rules.insert(id, intended, distribution);
    }

    for (row, cells) in grid.iter().enumerate() {
        for (col, &c) in cells.iter().enumerate() {
            if rules.contains(c) {
                placement.insert(Location::new(row, col), c);
            } else if !Tile::RESERVED.contains(&c) {
                log::warn!("Behaviour cell ({row}, {col}) names undeclared rule `{c}`");
            }
        }
    }

    Ok((rules, placement))
}

/// Parse `id-action-[action:p,...]`, ignoring whitespace
fn parse_rule(line: &Line) -> Result<(char, Action, ActionDistribution), ParseError> {
    let malformed = |reason| ParseError::MalformedRule {
        line: line.number,
        text: line.text.to_owned(),
        reason,
    };

    let rule: String = line.text.chars().filter(|c| !c.is_whitespace()).collect();
    let mut parts = rule.splitn(3, '-');
    let (Some(id), Some(action), Some(mapping)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed("expected `id-action-[action:probability,...]`"));
    };

    let mut id_chars = id.chars();
    let id = match (id_chars.next(), id_chars.next()) {
        (Some(c), None) => c,
        _ => return Err(malformed("rule id must be a single character")),
    };
    let intended = Action::from_str(action).map_err(|_| malformed("unknown intended action"))?;
    let mapping = mapping
        .strip_prefix('[')
        .and_then(|m| m.strip_suffix(']'))
        .ok_or_else(|| malformed("distribution must be enclosed in brackets"))?;

    let outcomes = mapping
        .split(',')
        .map(|pair| {
            let (action, p) = pair
                .split_once(':')
                .ok_or_else(|| malformed("outcome must be `action:probability`"))?;
            let action =
                Action::from_str(action).map_err(|_| malformed("unknown executed action"))?;
            let p = p
                .parse::<f64>()
                .map_err(|_| malformed("probability is not a number"))?;
            Ok((action, p))
        })
        .collect::<Result<Vec<_>, ParseError>>()?;

    let distribution =
        ActionDistribution::new(outcomes).map_err(|sum| ParseError::InvalidDistribution {
            line: line.number,
            rule: id,
            action: intended,
            sum,
        })?;

    Ok((id, intended, distribution))
}

fn parse_rewards(
    lines: &[Line],
    height: usize,
    width: usize,
) -> Result<HashMap<Location, i64>, ParseError> {
    let mut rewards = HashMap::new();
    if lines.is_empty() {
        return Ok(rewards);
    }

    let (grid, bindings) = split_overlay(Section::Rewards, lines, height, width)?;
    let mut values = HashMap::new();
    for line in bindings {
        let (symbol, value) = split_mapping(Section::Rewards, line)?;
        let value = value
            .parse::<i64>()
            .map_err(|_| ParseError::InvalidRewardValue {
                line: line.number,
                value: value.to_owned(),
            })?;
        values.insert(symbol, value);
    }

    for (row, cells) in grid.iter().enumerate() {
        for (col, &symbol) in cells.iter().enumerate() {
            if Tile::RESERVED.contains(&symbol) {
                continue;
            }
            let location = Location::new(row, col);
            let value = values
                .get(&symbol)
                .copied()
                .ok_or(ParseError::UnboundRewardSymbol { symbol, location })?;
            rewards.insert(location, value);
        }
    }

    Ok(rewards)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_ROOMS: &str = include_str!("../worlds/two_rooms.wdl");

    #[test]
    fn parses_special_tiles() {
        let world = parse(TWO_ROOMS).unwrap();
        assert_eq!((world.height(), world.width()), (7, 9), "Dimensions");
        assert_eq!(world.start(), Location::new(1, 1), "Start found");
        assert_eq!(world.tile(world.start()), Some(Tile::Empty), "Start stored as empty");
        assert_eq!(
            world.goals(),
            &HashSet::from([Location::new(2, 7)]),
            "Goal set"
        );
        assert_eq!(
            world.terminals(),
            &HashSet::from([Location::new(5, 3)]),
            "Terminal set"
        );
        assert_eq!(
            world.toggles(),
            &HashSet::from([Location::new(5, 1)]),
            "Toggle set"
        );
        assert_eq!(world.tile(Location::new(2, 4)), Some(Tile::Door), "Door kept");
    }

    #[test]
    fn parses_rules_and_rewards() {
        let world = parse(TWO_ROOMS).unwrap();
        assert_eq!(
            world.rule_placement(),
            &HashMap::from([(Location::new(2, 3), 'x')]),
            "Only declared ids are placed"
        );

        let rule = world.rules().get('x').unwrap();
        assert_eq!(
            rule.distribution(Action::Right).unwrap().outcomes(),
            [(Action::Right, 0.5), (Action::Down, 0.5)],
            "Whitespace in rules ignored"
        );
        assert_eq!(
            rule.distribution(Action::Up).unwrap().outcomes(),
            [(Action::Left, 1.0)],
            "Second override merged"
        );
        assert!(rule.distribution(Action::Left).is_none(), "Uncovered action");

        assert_eq!(
            world.rewards(),
            &HashMap::from([
                (Location::new(2, 2), 5),
                (Location::new(5, 5), -3),
                (Location::new(5, 7), -3),
            ]),
            "Reward symbols bound to values"
        );
    }

    #[test]
    fn parsing_is_deterministic() {
        let a = parse(TWO_ROOMS).unwrap();
        let b: WorldModel = TWO_ROOMS.parse().unwrap();
        assert_eq!(a, b, "Same document, same world");
    }

    #[test]
    fn optional_sections() {
        let world = parse("// header comment\nLayout\n\n####\n#EG#\n####\n").unwrap();
        assert!(world.abstraction().is_none(), "No abstraction");
        assert!(world.rules().is_empty(), "No rules");
        assert!(world.rewards().is_empty(), "No rewards");
    }

    #[test]
    fn comments_and_blank_lines_inside_grids() {
        let text = concat!(
            "Layout\n#####\n#E  #\n#   #\n#  G#\n#####\n",
            "Behaviour\n#####\n#   #\n// the slippery cell\n# a #\n\n#   #\n#####\n",
            "\n// rules\na-up-[left:1.0]\n",
            "Rewards\n#####\n  // coins\n#  $#\n\n#   #\n#$  #\n#####\n",
            "\n// bindings\n$:7\n",
        );
        let world = parse(text).unwrap();
        assert_eq!(
            world.rule_placement(),
            &HashMap::from([(Location::new(2, 2), 'a')]),
            "Rule placed below the comment row"
        );
        assert!(world.rules().contains('a'), "Rule after comment parsed");
        assert_eq!(
            world.rewards(),
            &HashMap::from([(Location::new(1, 3), 7), (Location::new(3, 1), 7)]),
            "Rewards land on their grid cells"
        );
    }

    #[test]
    fn header_matches_substring_and_ignores_preamble() {
        let world = parse("stray line\n== The Layout ==\n####\n#EG#\n####\n").unwrap();
        assert_eq!(world.height(), 3, "Preamble skipped, decorated header recognized");
    }

    #[test]
    fn short_overlay_rows_are_padded() {
        let text = "Layout\n#####\n#E G#\n#####\nAbstraction\n#####\n#a\n#####\n";
        let world = parse(text).unwrap();
        let abstraction = world.abstraction().unwrap();
        assert_eq!(abstraction.name_at(Location::new(1, 1)), Some("a"), "Symbol kept");
        assert_eq!(abstraction.name_at(Location::new(1, 2)), None, "Padding is blank");
    }

    #[test]
    fn structural_errors() {
        assert!(matches!(parse("Rewards\n"), Err(ParseError::EmptyLayout)));
        assert!(matches!(
            parse("Layout\n####\n#EG#\n###\n"),
            Err(ParseError::MalformedLayout {
                section: Section::Layout,
                line: 4,
                expected: 4,
                found: 3
            })
        ));
        assert!(matches!(parse("Layout\n####\n# G#\n####\n"), Err(ParseError::MissingStart)));
        assert!(matches!(parse("Layout\n####\n#E #\n####\n"), Err(ParseError::MissingGoal)));
        assert!(matches!(
            parse("Layout\n#####\n#EGE#\n#####\n"),
            Err(ParseError::MultipleStarts { line: 3, first: Location { row: 1, col: 1 } })
        ));
        assert!(matches!(
            parse("Layout\n####\n#EG#\n####\nAbstraction\n####\n"),
            Err(ParseError::MissingRows { section: Section::Abstraction, expected: 3, found: 1 })
        ));
        assert!(matches!(
            parse("Layout\n####\n#EG#\n####\nRewards\n####\n#EG##\n####\n"),
            Err(ParseError::MalformedLayout { section: Section::Rewards, line: 7, .. })
        ));
    }

    #[test]
    fn mapping_errors() {
        let base = "Layout\n####\n#EG#\n####\n";
        assert!(matches!(
            parse(&format!("{base}Abstraction\n####\n#ab#\n####\nab:name\n")),
            Err(ParseError::MalformedMapping { section: Section::Abstraction, line: 9, .. })
        ));
        assert!(matches!(
            parse(&format!("{base}Rewards\n####\n#E$#\n####\n$:ten\n")),
            Err(ParseError::InvalidRewardValue { line: 9, .. })
        ));
        assert!(matches!(
            parse(&format!("{base}Rewards\n####\n#E$#\n####\n%:10\n")),
            Err(ParseError::UnboundRewardSymbol { symbol: '$', .. })
        ));
    }

    #[test]
    fn rule_errors() {
        let parse_rule_line = |rule: &str| {
            parse(&format!(
                "Layout\n####\n#EG#\n####\nBehaviour\n####\n#r #\n####\n{rule}\n"
            ))
        };

        assert!(parse_rule_line("r-up-[up:0.5,left:0.5]").is_ok(), "Valid rule");
        for (rule, expected) in [
            ("r-up", "expected `id-action-[action:probability,...]`"),
            ("rr-up-[up:1.0]", "rule id must be a single character"),
            ("r-north-[up:1.0]", "unknown intended action"),
            ("r-up-up:1.0", "distribution must be enclosed in brackets"),
            ("r-up-[up]", "outcome must be `action:probability`"),
            ("r-up-[jump:1.0]", "unknown executed action"),
            ("r-up-[up:half]", "probability is not a number"),
        ] {
            match parse_rule_line(rule) {
                Err(ParseError::MalformedRule { line, reason, .. }) => {
                    assert_eq!(line, 9, "Line reported for `{rule}`");
                    assert_eq!(reason, expected, "Reason for `{rule}`");
                }
                other => panic!("`{rule}` should be malformed, got {other:?}"),
            }
        }

        assert!(matches!(
            parse_rule_line("r-up-[up:0.5,left:0.4]"),
            Err(ParseError::InvalidDistribution { rule: 'r', action: Action::Up, .. })
        ));
    }

    #[test]
    fn load_reads_files() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/worlds/two_rooms.wdl");
        assert_eq!(load(path).unwrap(), parse(TWO_ROOMS).unwrap(), "File matches text");
        assert!(matches!(load("/nonexistent/world.wdl"), Err(ParseError::Io(_))));
    }
}
