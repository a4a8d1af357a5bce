mod load_with_leader_changes;
