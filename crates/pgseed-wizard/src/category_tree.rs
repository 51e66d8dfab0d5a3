//! Depth-first category tree builder.
//!
//! Every sibling group is bulk inserted as soon as its names are collected so
//! children can reference real parent ids; the whole session still commits or
//! rolls back as one unit at the end.

use std::io::{BufRead, Write};

use pgseed_core::{CategoryDraft, CategoryTree, InsertedCategory};
use pgseed_storage::CategorySink;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{section, Console, WizardError};

#[derive(Debug, Clone, Default)]
pub struct CategoryReport {
    pub entity_id: Option<Uuid>,
    pub committed: bool,
    pub tree: CategoryTree,
}

impl CategoryReport {
    pub fn inserted(&self) -> usize {
        self.tree.len()
    }

    pub fn max_depth(&self) -> usize {
        self.tree.max_depth()
    }
}

/// Sibling group awaiting expansion.
struct Frame {
    handles: Vec<usize>,
    next: usize,
    level: usize,
}

pub fn banner<R: BufRead, W: Write>(console: &mut Console<R, W>) -> Result<(), WizardError> {
    section(
        console,
        "   HIERARCHICAL CATEGORY MANAGER\n   Depth-First | Yes/No Driven | Bulk Insert",
    )
}

/// Runs one session against `sink`, rolling back on any error.
pub async fn run_category_session<S, R, W>(
    sink: &mut S,
    console: &mut Console<R, W>,
) -> Result<CategoryReport, WizardError>
where
    S: CategorySink + ?Sized,
    R: BufRead,
    W: Write,
{
    match build_tree(sink, console).await {
        Ok(report) => Ok(report),
        Err(err) => {
            let notice = match &err {
                WizardError::InputClosed => "\n\n⚠ Input closed; operation cancelled.".to_string(),
                other => format!("\n✗ An error occurred: {other}"),
            };
            if let Err(write_err) = console.say(notice) {
                warn!(error = %write_err, "could not report the failure");
            }
            match sink.rollback().await {
                Ok(()) => {
                    if let Err(write_err) = console.say("✓ Transaction rolled back.") {
                        warn!(error = %write_err, "could not report the rollback");
                    }
                }
                Err(rollback_err) => {
                    warn!(error = %rollback_err, "rollback after failure also failed");
                }
            }
            Err(err)
        }
    }
}

async fn build_tree<S, R, W>(
    sink: &mut S,
    console: &mut Console<R, W>,
) -> Result<CategoryReport, WizardError>
where
    S: CategorySink + ?Sized,
    R: BufRead,
    W: Write,
{
    console.say("\n--- Initial Setup ---")?;
    let entity_id = console.ask_uuid("Enter the Entity ID (UUID format): ")?;
    console.say(format!("✓ Entity ID set to: {entity_id}"))?;

    section(console, "STEP 1: Top-Level Categories")?;
    let top_count = console.ask_positive_integer("Enter number of categories: ")?;
    let drafts = collect_names(console, top_count, "")?;

    console.say(format!("\nInserting {top_count} top-level categories..."))?;
    let inserted = insert_group(sink, console, entity_id, None, &drafts, "").await?;

    let mut tree = CategoryTree::new();
    let roots = tree.add_roots(&inserted);

    section(console, "STEP 2: Subcategory Expansion (Depth-First)")?;
    expand_depth_first(sink, console, entity_id, &mut tree, roots).await?;

    let rule = "=".repeat(60);
    console.say(format!("\n{rule}"))?;
    console.say(format!(
        "Category tree: {} inserted, {} level(s) deep",
        tree.len(),
        tree.max_depth()
    ))?;
    console.say(tree.render())?;
    console.say(&rule)?;

    let committed = console.ask_yes_no("Commit all changes to database? (y/n): ")?;
    if committed {
        sink.commit().await?;
        console.say("\n✓ All categories have been successfully inserted!")?;
    } else {
        sink.rollback().await?;
        console.say("\n✓ All changes have been rolled back. No data saved.")?;
    }
    info!(%entity_id, inserted = tree.len(), committed, "category session finished");

    Ok(CategoryReport {
        entity_id: Some(entity_id),
        committed,
        tree,
    })
}

/// Asks about subcategories for every node, finishing a subtree before its next sibling.
async fn expand_depth_first<S, R, W>(
    sink: &mut S,
    console: &mut Console<R, W>,
    entity_id: Uuid,
    tree: &mut CategoryTree,
    roots: Vec<usize>,
) -> Result<(), WizardError>
where
    S: CategorySink + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut stack = vec![Frame {
        handles: roots,
        next: 0,
        level: 1,
    }];

    while let Some(frame) = stack.last_mut() {
        if frame.next >= frame.handles.len() {
            stack.pop();
            continue;
        }
        let position = frame.next + 1;
        let total = frame.handles.len();
        let handle = frame.handles[frame.next];
        let level = frame.level;
        frame.next += 1;

        let Some((parent_id, name)) = tree.node(handle).map(|n| (n.id, n.name.clone())) else {
            continue;
        };
        let indent = "  ".repeat(level);

        console.say(format!("\n{indent}[{position}/{total}] Processing: '{name}'"))?;
        let has_children = console.ask_yes_no(&format!(
            "{indent}Is subcategory available for \"{name}\"? (y/n): "
        ))?;
        if !has_children {
            console.say(format!("{indent}  → No subcategories for '{name}'"))?;
            continue;
        }

        let count = console.ask_positive_integer(&format!("{indent}Enter number of subcategories: "))?;
        let drafts = collect_names(console, count, &indent)?;
        console.say(format!("{indent}Inserting {count} subcategories..."))?;
        let inserted = insert_group(sink, console, entity_id, Some(parent_id), &drafts, &indent).await?;

        let children = tree.add_children(handle, &inserted);
        debug!(parent = %parent_id, children = children.len(), level = level + 1, "descending");
        stack.push(Frame {
            handles: children,
            next: 0,
            level: level + 1,
        });
    }
    Ok(())
}

async fn insert_group<S, R, W>(
    sink: &mut S,
    console: &mut Console<R, W>,
    entity_id: Uuid,
    parent: Option<Uuid>,
    drafts: &[CategoryDraft],
    indent: &str,
) -> Result<Vec<InsertedCategory>, WizardError>
where
    S: CategorySink + ?Sized,
    R: BufRead,
    W: Write,
{
    let ids = sink.insert_categories(entity_id, parent, drafts).await?;
    let inserted = drafts
        .iter()
        .zip(ids)
        .map(|(draft, id)| InsertedCategory {
            id,
            name: draft.name.clone(),
        })
        .collect::<Vec<_>>();
    for category in &inserted {
        console.say(format!(
            "{indent}  ✓ Inserted: '{}' (ID: {})",
            category.name, category.id
        ))?;
    }
    Ok(inserted)
}

/// Collects exactly `count` names, re-asking for the whole block on a count mismatch.
fn collect_names<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    count: usize,
    indent: &str,
) -> Result<Vec<CategoryDraft>, WizardError> {
    loop {
        console.say(format!(
            "{indent}--- Paste {count} category names below (one per line) ---"
        ))?;
        console.say(format!("{indent}--- Press ENTER twice when done ---"))?;

        let names = console.read_block()?;
        if names.len() != count {
            console.say(format!(
                "{indent}⚠ Expected {count} categories, but got {}.",
                names.len()
            ))?;
            console.say(format!("{indent}  Please re-enter all {count} names."))?;
            continue;
        }

        console.say(format!("{indent}✓ {count} categories parsed:"))?;
        let drafts = names
            .iter()
            .map(|name| CategoryDraft::from_name(name))
            .collect::<Vec<_>>();
        for (i, draft) in drafts.iter().enumerate() {
            console.say(format!("{indent}  {}. {}", i + 1, draft.name))?;
            console.say(format!("{indent}     → {}", draft.description))?;
        }
        return Ok(drafts);
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pgseed_storage::StoreError;

    use super::*;
    use crate::testing::{scripted, transcript};

    const ENTITY: &str = "67e55044-10b1-426f-9247-bb680e5fe0c8";

    #[derive(Default)]
    struct RecordingSink {
        inserts: Vec<(Option<Uuid>, Vec<String>, Vec<Uuid>)>,
        fail_on_call: Option<usize>,
        committed: bool,
        rolled_back: bool,
    }

    impl RecordingSink {
        fn ids_for(&self, name: &str) -> Option<Uuid> {
            self.inserts.iter().find_map(|(_, names, ids)| {
                names.iter().position(|n| n == name).map(|i| ids[i])
            })
        }
    }

    #[async_trait]
    impl CategorySink for RecordingSink {
        async fn insert_categories(
            &mut self,
            _entity_id: Uuid,
            parent: Option<Uuid>,
            drafts: &[CategoryDraft],
        ) -> Result<Vec<Uuid>, StoreError> {
            if self.fail_on_call == Some(self.inserts.len()) {
                return Err(StoreError::InsertMismatch {
                    expected: drafts.len(),
                    actual: 0,
                });
            }
            let ids = drafts.iter().map(|_| Uuid::new_v4()).collect::<Vec<_>>();
            self.inserts.push((
                parent,
                drafts.iter().map(|d| d.name.clone()).collect(),
                ids.clone(),
            ));
            Ok(ids)
        }

        async fn commit(&mut self) -> Result<(), StoreError> {
            self.committed = true;
            Ok(())
        }

        async fn rollback(&mut self) -> Result<(), StoreError> {
            self.rolled_back = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn expands_each_subtree_before_next_sibling() {
        let mut sink = RecordingSink::default();
        let mut console = scripted(&[
            "not-a-uuid",
            ENTITY,
            "2",
            "Electronics",
            "Books",
            "",
            "y",
            "2",
            "Phones",
            "Laptops",
            "",
            "y",
            "1",
            "Android",
            "",
            "n",
            "n",
            "n",
            "y",
        ]);

        let report = run_category_session(&mut sink, &mut console)
            .await
            .expect("session");

        assert!(report.committed);
        assert_eq!(report.inserted(), 5);
        assert_eq!(report.max_depth(), 3);
        assert_eq!(report.entity_id.map(|id| id.to_string()).as_deref(), Some(ENTITY));
        assert!(sink.committed);
        assert!(!sink.rolled_back);

        let groups = sink
            .inserts
            .iter()
            .map(|(_, names, _)| names.join(","))
            .collect::<Vec<_>>();
        assert_eq!(groups, vec!["Electronics,Books", "Phones,Laptops", "Android"]);
        assert_eq!(sink.inserts[0].0, None);
        assert_eq!(sink.inserts[1].0, sink.ids_for("Electronics"));
        assert_eq!(sink.inserts[2].0, sink.ids_for("Phones"));

        let out = transcript(console);
        assert!(out.contains("Invalid UUID format"));
        let order = out
            .lines()
            .filter_map(|line| line.split("Processing: ").nth(1))
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec!["'Electronics'", "'Phones'", "'Android'", "'Laptops'", "'Books'"]
        );
        assert!(out.contains("  [1/2] Processing: 'Electronics'"));
        assert!(out.contains("    Is subcategory available for \"Phones\"? (y/n): "));
        assert!(out.contains("      [1/1] Processing: 'Android'"));
        assert!(out.contains("     → Category for managing books related items"));
    }

    #[tokio::test]
    async fn wrong_name_count_asks_for_the_whole_block_again() {
        let mut sink = RecordingSink::default();
        let mut console = scripted(&[
            ENTITY, "2", "Only One", "", "Toys", "Garden", "", "n", "n", "y",
        ]);

        let report = run_category_session(&mut sink, &mut console)
            .await
            .expect("session");

        assert_eq!(report.inserted(), 2);
        assert_eq!(sink.inserts.len(), 1);
        let out = transcript(console);
        assert!(out.contains("⚠ Expected 2 categories, but got 1."));
        assert!(out.contains("Please re-enter all 2 names."));
    }

    #[tokio::test]
    async fn declining_commit_rolls_back() {
        let mut sink = RecordingSink::default();
        let mut console = scripted(&[ENTITY, "1", "Toys", "", "n", "n"]);

        let report = run_category_session(&mut sink, &mut console)
            .await
            .expect("session");

        assert!(!report.committed);
        assert!(sink.rolled_back);
        assert!(!sink.committed);
        assert!(transcript(console).contains("No data saved."));
    }

    #[tokio::test]
    async fn closed_input_rolls_back_and_reports() {
        let mut sink = RecordingSink::default();
        let mut console = scripted(&[ENTITY, "1", "Toys", "", "y", "2"]);

        let err = run_category_session(&mut sink, &mut console)
            .await
            .expect_err("input ends mid-session");

        assert!(matches!(err, WizardError::InputClosed));
        assert!(sink.rolled_back);
        assert!(!sink.committed);
        assert!(transcript(console).contains("operation cancelled"));
    }

    #[tokio::test]
    async fn store_failure_rolls_back_whole_session() {
        let mut sink = RecordingSink {
            fail_on_call: Some(1),
            ..RecordingSink::default()
        };
        let mut console = scripted(&[ENTITY, "1", "Toys", "", "y", "1", "Lego", ""]);

        let err = run_category_session(&mut sink, &mut console)
            .await
            .expect_err("second insert fails");

        assert!(matches!(err, WizardError::Store(_)));
        assert!(sink.rolled_back);
        assert_eq!(sink.inserts.len(), 1);
        assert!(transcript(console).contains("✗ An error occurred"));
    }

    struct BrokenTerminal;

    impl Write for BrokenTerminal {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "terminal gone"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unwritable_terminal_still_rolls_back() {
        let mut sink = RecordingSink::default();
        let mut console = Console::new(std::io::Cursor::new(Vec::new()), BrokenTerminal);

        let err = run_category_session(&mut sink, &mut console)
            .await
            .expect_err("terminal write fails");

        assert!(matches!(err, WizardError::Io(_)));
        assert!(sink.rolled_back);
        assert!(sink.inserts.is_empty());
    }
}
