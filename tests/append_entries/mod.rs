mod append_entries_case1;
