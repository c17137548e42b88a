use std::sync::Arc;
use std::time::Duration;

use crate::downloader::QueueEntry;
use crate::downloader::test_helpers::*;
use crate::error::{DownloadError, Error};
use crate::types::{Event, FileStatus, JobStatus};

// -----------------------------------------------------------------------
// admission
// -----------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_file_frees_slot_for_next_entry() {
    let h = create_test_downloader(2).await;
    let dl = &h.downloader;
    let names = ["001_a.pdf", "002_b.pdf", "003_c.pdf"];
    for name in names {
        h.fetcher.hold(name);
    }
    h.fetcher.fail("001_a.pdf", "connection reset");

    let files = add_named_files(dl, &names).await;
    let job = submit_job(dl, "1-3", &files).await;

    // A and B take both slots, C waits
    wait_for_started(&h.fetcher, 2).await;
    assert_eq!(h.fetcher.started(), vec!["001_a.pdf", "002_b.pdf"]);
    assert_eq!(file_status(dl, files[2].id).await, FileStatus::Queued);
    assert_eq!(dl.queue_len().await, 1);
    assert_eq!(dl.active_count().await, 2);

    // A fails: its slot goes to C
    h.fetcher.release("001_a.pdf");
    wait_for_file_status(dl, files[0].id, FileStatus::Failed).await;
    wait_for_started(&h.fetcher, 3).await;
    assert_eq!(h.fetcher.started()[2], "003_c.pdf");

    // B succeeds
    h.fetcher.release("002_b.pdf");
    wait_for_file_status(dl, files[1].id, FileStatus::Completed).await;
    wait_for_downloaded(dl, job, 1).await;
    assert_eq!(dl.queue_len().await, 0);

    h.fetcher.release("003_c.pdf");
    wait_for_file_status(dl, files[2].id, FileStatus::Completed).await;
    wait_until_idle(dl).await;
    wait_for_downloaded(dl, job, 2).await;

    let file_a = dl.db.get_file(files[0].id).await.unwrap().unwrap();
    assert_eq!(file_a.status, FileStatus::Failed);
    assert_eq!(file_a.progress, 0);
    // One file failed, so the job can never reach its total on its own
    assert_eq!(job_status(dl, job).await, JobStatus::InProgress);
    assert!(dl.db.list_archives().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_exceeds_worker_capacity() {
    let h = create_test_downloader(2).await;
    let dl = &h.downloader;
    let names: Vec<String> = (1..=6).map(|i| format!("{:03}_doc.pdf", i)).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    for name in &name_refs {
        h.fetcher.hold(name);
    }

    let files = add_named_files(dl, &name_refs).await;
    let job = submit_job(dl, "1-6", &files).await;

    wait_for_started(&h.fetcher, 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.fetcher.started().len(), 2);
    let downloading = dl
        .db
        .list_files_by_status(FileStatus::Downloading)
        .await
        .unwrap();
    assert_eq!(downloading.len(), 2);

    for name in &name_refs {
        h.fetcher.release(name);
        let downloading = dl
            .db
            .list_files_by_status(FileStatus::Downloading)
            .await
            .unwrap();
        assert!(downloading.len() <= 2);
    }

    wait_for_job_status(dl, job, JobStatus::Completed).await;
    assert_eq!(h.fetcher.max_in_flight(), 2);
    assert_eq!(h.fetcher.started().len(), 6);
}

#[tokio::test]
async fn entries_start_in_fifo_order_across_jobs() {
    let h = create_test_downloader(1).await;
    let dl = &h.downloader;

    let first = add_named_files(dl, &["001_a.pdf", "002_b.pdf"]).await;
    let second = add_named_files(dl, &["010_c.pdf"]).await;
    h.fetcher.hold("001_a.pdf");

    let job1 = submit_job(dl, "1-2", &first).await;
    let job2 = submit_job(dl, "10-10", &second).await;
    assert_eq!(dl.queue_len().await, 2);

    h.fetcher.release("001_a.pdf");
    wait_for_job_status(dl, job1, JobStatus::Completed).await;
    wait_for_job_status(dl, job2, JobStatus::Completed).await;

    assert_eq!(
        h.fetcher.started(),
        vec!["001_a.pdf", "002_b.pdf", "010_c.pdf"]
    );
}

#[tokio::test]
async fn submit_marks_files_queued_and_job_in_progress() {
    let h = create_test_downloader(1).await;
    let dl = &h.downloader;
    let mut events = dl.subscribe();

    let files = add_named_files(dl, &["001_a.pdf", "002_b.pdf"]).await;
    h.fetcher.hold("001_a.pdf");
    let job = submit_job(dl, "1-2", &files).await;

    assert_eq!(job_status(dl, job).await, JobStatus::InProgress);
    assert_eq!(file_status(dl, files[1].id).await, FileStatus::Queued);

    match events.recv().await.unwrap() {
        Event::JobQueued { job_id, files } => {
            assert_eq!(job_id, job);
            assert_eq!(files, 2);
        }
        other => panic!("unexpected event {:?}", other),
    }

    h.fetcher.release("001_a.pdf");
    wait_for_job_status(dl, job, JobStatus::Completed).await;
}

// -----------------------------------------------------------------------
// rejected submissions
// -----------------------------------------------------------------------

#[tokio::test]
async fn file_already_in_queue_cannot_be_submitted_twice() {
    let h = create_test_downloader(1).await;
    let dl = &h.downloader;
    let files = add_named_files(dl, &["001_a.pdf"]).await;
    h.fetcher.hold("001_a.pdf");

    submit_job(dl, "1-1", &files).await;
    wait_for_started(&h.fetcher, 1).await;

    let other = dl.create_job("1-1", 1).await.unwrap();
    let err = dl.submit_batch(other.id, files.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Download(DownloadError::FileBusy {
            status: FileStatus::Downloading,
            ..
        })
    ));

    h.fetcher.release("001_a.pdf");
    wait_until_idle(dl).await;
    assert_eq!(h.fetcher.started_count("001_a.pdf"), 1);
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let h = create_test_downloader(1).await;
    let job = h.downloader.create_job("1-5", 0).await.unwrap();

    let err = h.downloader.submit_batch(job.id, vec![]).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Download(DownloadError::EmptySelection { .. })
    ));
    assert_eq!(job_status(&h.downloader, job.id).await, JobStatus::Queued);
}

#[tokio::test]
async fn unknown_job_is_rejected() {
    let h = create_test_downloader(1).await;
    let files = add_named_files(&h.downloader, &["001_a.pdf"]).await;

    let err = h
        .downloader
        .submit_batch(crate::types::JobId(999), files)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Download(DownloadError::JobNotFound { .. })
    ));
}

#[tokio::test]
async fn completed_job_does_not_accept_batches() {
    let h = create_test_downloader(1).await;
    let dl = &h.downloader;
    let files = add_named_files(dl, &["001_a.pdf"]).await;
    let job = submit_job(dl, "1-1", &files).await;
    wait_for_job_status(dl, job, JobStatus::Completed).await;

    let err = dl.submit_batch(job, files).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Download(DownloadError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn stopped_jobs_do_not_accept_batches() {
    let h = create_test_downloader_with(1, |_| {}, Arc::new(FailingArchiver)).await;
    let dl = &h.downloader;
    let files = add_named_files(dl, &["001_a.pdf", "002_b.pdf"]).await;

    // Archive failed with the counter already at its total
    let failed = submit_job(dl, "1-1", &files[..1]).await;
    wait_for_job_status(dl, failed, JobStatus::Failed).await;
    wait_until_idle(dl).await;

    let err = dl.submit_batch(failed, files[..1].to_vec()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Download(DownloadError::InvalidState { .. })
    ));
    assert_eq!(job_status(dl, failed).await, JobStatus::Failed);
    assert_eq!(file_status(dl, files[0].id).await, FileStatus::Completed);
    assert_eq!(dl.queue_len().await, 0);
    assert_eq!(h.fetcher.started_count("001_a.pdf"), 1);

    let cancelled = dl.create_job("2-2", 1).await.unwrap();
    dl.cancel(cancelled.id).await.unwrap();
    let err = dl
        .submit_batch(cancelled.id, files[1..].to_vec())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Download(DownloadError::InvalidState { .. })
    ));
    assert_eq!(job_status(dl, cancelled.id).await, JobStatus::Cancelled);
    assert_eq!(file_status(dl, files[1].id).await, FileStatus::Ready);
    assert_eq!(h.fetcher.started_count("002_b.pdf"), 0);
}

// -----------------------------------------------------------------------
// fetch bookkeeping
// -----------------------------------------------------------------------

#[tokio::test]
async fn file_fails_when_its_completion_cannot_be_stored() {
    let h = create_test_downloader(1).await;
    let dl = &h.downloader;
    let mut events = dl.subscribe();
    let files = add_named_files(dl, &["001_a.pdf", "002_b.pdf"]).await;
    sqlx::query(
        "CREATE TRIGGER reject_completion BEFORE UPDATE ON files WHEN NEW.status = 3 \
         BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END",
    )
    .execute(dl.db.pool())
    .await
    .unwrap();

    let job = submit_job(dl, "1-2", &files).await;
    for file in &files {
        wait_for_file_status(dl, file.id, FileStatus::Failed).await;
    }
    wait_until_idle(dl).await;

    // Neither file was counted and the slot was handed on
    assert_eq!(h.fetcher.started(), vec!["001_a.pdf", "002_b.pdf"]);
    let record = dl.db.get_job(job).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::InProgress);
    assert_eq!(record.downloaded_files, 0);

    let mut failed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, Event::FileFailed { job_id, .. } if job_id == job) {
            failed += 1;
        }
    }
    assert_eq!(failed, 2);

    // Once the store accepts the write again the files can be retried
    sqlx::query("DROP TRIGGER reject_completion")
        .execute(dl.db.pool())
        .await
        .unwrap();
    dl.retry_job(job).await.unwrap();
    wait_for_job_status(dl, job, JobStatus::Completed).await;
}

// -----------------------------------------------------------------------
// dequeue guard
// -----------------------------------------------------------------------

#[tokio::test]
async fn entry_for_file_not_queued_never_starts_a_fetch() {
    let h = create_test_downloader(1).await;
    let dl = &h.downloader;
    let files = add_named_files(dl, &["001_a.pdf"]).await;
    let job = dl.create_job("1-1", 1).await.unwrap();

    // Bypass submit_batch: the file is still `ready`
    {
        let mut scheduler = dl.queue_state.scheduler.lock().await;
        let token = scheduler.token_for(job.id);
        scheduler.pending.push_back(QueueEntry {
            job_id: job.id,
            file: files[0].clone(),
            token,
        });
    }
    dl.drain_queue().await;
    wait_until_idle(dl).await;

    assert!(h.fetcher.started().is_empty());
    assert_eq!(file_status(dl, files[0].id).await, FileStatus::Ready);
    assert_eq!(dl.active_count().await, 0);
}
