//! Directory listing integration tests.

#[cfg(test)]
mod tests {
    use ruststack_s3fs_core::DirectoryStream;

    use crate::{
        cleanup_bucket, create_test_bucket, open_file_system, put_objects, s3_client,
        s3fs_provider,
    };

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_list_immediate_children() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "iter").await;
        put_objects(
            &client,
            &bucket,
            &["dir/file1", "dir/file2", "dir/sub/deep", "dir/", "other"],
            b"x",
        )
        .await;

        let provider = s3fs_provider();
        let fs = open_file_system(&provider);
        let stream = DirectoryStream::new(&fs, &bucket, "dir/").expect("stream");
        let names: Vec<String> = stream
            .collect_paths()
            .await
            .expect("list")
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string()))
            .collect();

        assert_eq!(names, ["file1", "file2", "sub"]);

        provider.close(&fs);
        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_page_through_more_than_one_thousand_entries() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "pages").await;
        let keys: Vec<String> = (0..1050).map(|i| format!("big/file{i:04}")).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        put_objects(&client, &bucket, &refs, b"").await;

        let provider = s3fs_provider();
        let fs = open_file_system(&provider);
        let paths = DirectoryStream::new(&fs, &bucket, "big/")
            .expect("stream")
            .collect_paths()
            .await
            .expect("list");

        assert_eq!(paths.len(), 1050);

        provider.close(&fs);
        cleanup_bucket(&client, &bucket).await;
    }
}
