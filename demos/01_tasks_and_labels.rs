//! Demo 01: Tasks and Labels
//!
//! This demo walks through creating, updating, labelling and deleting tasks
//! with TodoStore.
//!
//! Run with: cargo run --example 01_tasks_and_labels

use eyre::Result;
use todostore::{NewLabel, NewTask, Store, TaskPatch};

fn main() -> Result<()> {
    // Create a temporary directory for this demo
    let temp_dir = tempfile::tempdir()?;
    let db_path = temp_dir.path().join("todo.db");

    println!("TodoStore Tasks and Labels Demo");
    println!("===============================\n");
    println!("Database: {}\n", db_path.display());

    let mut store = Store::open(&db_path)?;

    // CREATE
    println!("1. CREATE - Adding tasks...");
    let report = store.add_task(
        &NewTask::new("Quarterly report")
            .category("Work")
            .notes("Include Q3 metrics")
            .priority("1"),
    )?;
    let milk = store.add_task(&NewTask::new("Buy milk").deadline("tomorrow"))?;
    println!("   Created tasks {} and {}\n", report, milk);

    // VALIDATION
    println!("2. VALIDATION - Rejected inputs...");
    for bad in [NewTask::new("   "), NewTask::new("Ship it").priority("99")] {
        match store.add_task(&bad) {
            Ok(id) => println!("   Unexpectedly created {}", id),
            Err(e) => println!("   {} - {}", e.code(), e),
        }
    }
    println!();

    // UPDATE
    println!("3. UPDATE - Partial update and completion...");
    store.update_task(report, &TaskPatch::default().priority(Some("ASAP")))?;
    store.mark_completed(milk)?;
    for task in store.get_all_tasks()? {
        let status = if task.completed { "x" } else { " " };
        let priority = task.priority.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        println!("   [{}] #{} {} (priority {})", status, task.id, task.title, priority);
    }
    println!();

    // LABELS
    println!("4. LABELS - Linking...");
    let work = store.add_label(&NewLabel::new("work").color("#3366ff"))?;
    let again = store.add_label(&NewLabel::new("work"))?;
    println!("   'work' created twice -> ids {} and {}", work, again);
    store.link_task_label(report, work)?;
    for label in store.get_task_labels(report)? {
        println!("   Task {} has label {} ({:?})", report, label.name, label.color);
    }
    if let Err(e) = store.link_task_label(report, work) {
        println!("   Linking again: {}", e.code());
    }
    println!();

    // DELETE
    println!("5. DELETE - Removing a label and a task...");
    store.delete_label(work)?;
    store.delete_task(milk)?;
    println!("   Remaining tasks: {}", store.get_all_tasks()?.len());
    println!("   Remaining labels: {}\n", store.get_all_labels()?.len());

    store.close();
    println!("Demo complete!");
    Ok(())
}
