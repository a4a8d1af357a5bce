mod retry_after_restart;
